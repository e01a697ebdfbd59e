//! Throwaway topology construction.
//!
//! Declares `exchange_count` direct exchanges, `queue_count` quorum queues,
//! and binds the full {queue x exchange x routing key} cross-product. One
//! published message is therefore deliverable to every queue bound under
//! its routing key. Construction is best-effort: a failed declare or bind
//! is logged and that entity is skipped, and the run proceeds with whatever
//! subset succeeded.

use std::collections::HashMap;

use tracing::{error, info};

use crate::broker::{Broker, BrokerError};
use crate::config::LoadConfig;

/// Everything the builder created, handed read-only to the workers and the
/// reclaimer.
#[derive(Debug, Clone)]
pub struct Topology {
    pub exchanges: Vec<String>,
    pub queues: Vec<String>,
    pub routing_keys: Vec<String>,
    /// Routing keys usable on each exchange.
    pub keys_by_exchange: HashMap<String, Vec<String>>,
}

pub fn exchange_name(index: usize) -> String {
    format!("test-exchange-{index}")
}

pub fn queue_name(index: usize) -> String {
    format!("test-queue-{index}")
}

pub fn routing_key(index: usize) -> String {
    format!("test-routing-key-{index}")
}

/// Declares exchanges and queues and binds the full cross-product.
///
/// Fails only when the declaring channel cannot be opened; individual
/// declare/bind failures drop the affected entity and continue.
pub async fn build(broker: &dyn Broker, config: &LoadConfig) -> Result<Topology, BrokerError> {
    let channel = broker.open_channel().await?;

    let mut exchanges = Vec::with_capacity(config.exchange_count);
    for i in 0..config.exchange_count {
        let name = exchange_name(i);
        match channel.declare_exchange(&name).await {
            Ok(()) => exchanges.push(name),
            Err(e) => error!(exchange = %name, error = %e, "failed to declare exchange"),
        }
    }

    let mut queues = Vec::with_capacity(config.queue_count);
    for i in 0..config.queue_count {
        let name = queue_name(i);
        match channel.declare_queue(&name).await {
            Ok(()) => queues.push(name),
            Err(e) => error!(queue = %name, error = %e, "failed to declare queue"),
        }
    }

    let routing_keys: Vec<String> = (0..config.routing_key_count).map(routing_key).collect();

    let mut keys_by_exchange: HashMap<String, Vec<String>> = HashMap::new();
    for exchange in &exchanges {
        for key in &routing_keys {
            for queue in &queues {
                if let Err(e) = channel.bind_queue(queue, exchange, key).await {
                    error!(
                        queue = %queue,
                        exchange = %exchange,
                        routing_key = %key,
                        error = %e,
                        "failed to bind queue"
                    );
                }
            }
            let keys = keys_by_exchange.entry(exchange.clone()).or_default();
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
    }

    info!(
        exchanges = exchanges.len(),
        queues = queues.len(),
        routing_keys = routing_keys.len(),
        "topology created"
    );

    Ok(Topology {
        exchanges,
        queues,
        routing_keys,
        keys_by_exchange,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::broker::mock::MockBroker;

    fn config(exchanges: usize, queues: usize, keys: usize) -> LoadConfig {
        LoadConfig {
            duration: Duration::from_secs(1),
            queue_count: queues,
            exchange_count: exchanges,
            routing_key_count: keys,
            message_size: 64,
            parallel_clients: 1,
        }
    }

    #[tokio::test]
    async fn test_binding_cross_product_is_complete() {
        let broker = MockBroker::new();
        let topology = build(&broker, &config(3, 4, 5)).await.unwrap();

        assert_eq!(topology.exchanges.len(), 3);
        assert_eq!(topology.queues.len(), 4);
        assert_eq!(topology.routing_keys.len(), 5);
        assert_eq!(broker.binding_count(), 3 * 4 * 5);

        for exchange in &topology.exchanges {
            let keys = &topology.keys_by_exchange[exchange];
            assert_eq!(keys.len(), 5);
        }
    }

    #[tokio::test]
    async fn test_failed_declare_skips_entity_and_continues() {
        let broker = MockBroker::new();
        broker.fail_declare_exchange("test-exchange-0");
        broker.fail_declare_queue("test-queue-1");

        let topology = build(&broker, &config(2, 2, 2)).await.unwrap();

        assert_eq!(topology.exchanges, vec!["test-exchange-1"]);
        assert_eq!(topology.queues, vec!["test-queue-0"]);
        // Only surviving entities get bound: 1 exchange x 1 queue x 2 keys.
        assert_eq!(broker.binding_count(), 2);
        assert!(!topology.keys_by_exchange.contains_key("test-exchange-0"));
    }

    #[test]
    fn test_deterministic_names() {
        assert_eq!(exchange_name(0), "test-exchange-0");
        assert_eq!(queue_name(7), "test-queue-7");
        assert_eq!(routing_key(12), "test-routing-key-12");
    }
}
