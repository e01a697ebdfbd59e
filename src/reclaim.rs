//! Topology teardown.
//!
//! Best-effort reverse of the builder: purge every queue, unbind every
//! binding triple, delete the queues, then delete the exchanges. Purging
//! first avoids non-empty-queue delete errors on brokers that enforce
//! them; unbinding before exchange deletion avoids dangling-binding errors
//! on strict brokers. Failures are recorded in the returned report and
//! never abort the pass.

use tracing::{debug, error, info};

use crate::broker::Broker;
use crate::topology::Topology;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimOp {
    OpenChannel,
    Purge,
    Unbind,
    DeleteQueue,
    DeleteExchange,
}

#[derive(Debug)]
pub struct ReclaimEntry {
    pub entity: String,
    pub operation: ReclaimOp,
    pub outcome: Result<String, String>,
}

/// Per-entity outcomes of one teardown pass.
#[derive(Debug, Default)]
pub struct ReclaimReport {
    pub entries: Vec<ReclaimEntry>,
}

impl ReclaimReport {
    fn record(&mut self, entity: &str, operation: ReclaimOp, outcome: Result<String, String>) {
        self.entries.push(ReclaimEntry {
            entity: entity.to_string(),
            operation,
            outcome,
        });
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReclaimEntry> {
        self.entries.iter().filter(|entry| entry.outcome.is_err())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn is_clean(&self) -> bool {
        self.failure_count() == 0
    }
}

pub async fn reclaim(broker: &dyn Broker, topology: &Topology) -> ReclaimReport {
    let mut report = ReclaimReport::default();

    let channel = match broker.open_channel().await {
        Ok(channel) => channel,
        Err(e) => {
            error!(error = %e, "failed to open channel for cleanup");
            report.record("channel", ReclaimOp::OpenChannel, Err(e.to_string()));
            return report;
        }
    };

    for queue in &topology.queues {
        match channel.purge_queue(queue).await {
            Ok(purged) => {
                info!(queue = %queue, purged, "purged queue");
                report.record(queue, ReclaimOp::Purge, Ok(format!("purged {purged}")));
            }
            Err(e) => {
                error!(queue = %queue, error = %e, "failed to purge queue");
                report.record(queue, ReclaimOp::Purge, Err(e.to_string()));
            }
        }
    }

    // Unbind unconditionally; a binding that never existed (the builder
    // skipped its entity) just produces debug-level noise.
    for queue in &topology.queues {
        for exchange in &topology.exchanges {
            for key in &topology.routing_keys {
                match channel.unbind_queue(queue, exchange, key).await {
                    Ok(()) => report.record(
                        queue,
                        ReclaimOp::Unbind,
                        Ok(format!("unbound from {exchange} ({key})")),
                    ),
                    Err(e) => {
                        debug!(
                            queue = %queue,
                            exchange = %exchange,
                            routing_key = %key,
                            error = %e,
                            "failed to unbind queue"
                        );
                        report.record(queue, ReclaimOp::Unbind, Err(e.to_string()));
                    }
                }
            }
        }
    }

    for queue in &topology.queues {
        match channel.delete_queue(queue).await {
            Ok(remaining) => {
                info!(queue = %queue, remaining, "deleted queue");
                report.record(
                    queue,
                    ReclaimOp::DeleteQueue,
                    Ok(format!("{remaining} messages remaining")),
                );
            }
            Err(e) => {
                error!(queue = %queue, error = %e, "failed to delete queue");
                report.record(queue, ReclaimOp::DeleteQueue, Err(e.to_string()));
            }
        }
    }

    for exchange in &topology.exchanges {
        match channel.delete_exchange(exchange).await {
            Ok(()) => {
                info!(exchange = %exchange, "deleted exchange");
                report.record(exchange, ReclaimOp::DeleteExchange, Ok("deleted".into()));
            }
            Err(e) => {
                error!(exchange = %exchange, error = %e, "failed to delete exchange");
                report.record(exchange, ReclaimOp::DeleteExchange, Err(e.to_string()));
            }
        }
    }

    info!(
        operations = report.entries.len(),
        failures = report.failure_count(),
        "cleanup completed"
    );
    report
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::broker::mock::MockBroker;
    use crate::config::LoadConfig;
    use crate::topology;

    fn config() -> LoadConfig {
        LoadConfig {
            duration: Duration::from_secs(1),
            queue_count: 2,
            exchange_count: 2,
            routing_key_count: 2,
            message_size: 64,
            parallel_clients: 1,
        }
    }

    #[tokio::test]
    async fn test_reclaim_removes_everything() {
        let broker = MockBroker::new();
        let topo = topology::build(&broker, &config()).await.unwrap();

        let report = reclaim(&broker, &topo).await;

        assert!(report.is_clean());
        assert!(broker.queue_names().is_empty());
        assert!(broker.exchange_names().is_empty());
        assert_eq!(broker.binding_count(), 0);
    }

    #[tokio::test]
    async fn test_reclaim_purges_before_delete() {
        let broker = MockBroker::new();
        let topo = topology::build(&broker, &config()).await.unwrap();
        broker
            .publish("test-exchange-0", "test-routing-key-0", b"leftover")
            .await
            .unwrap();

        let report = reclaim(&broker, &topo).await;

        let purges: Vec<_> = report
            .entries
            .iter()
            .filter(|entry| entry.operation == ReclaimOp::Purge)
            .collect();
        assert_eq!(purges.len(), 2);
        // Both queues were bound under that key, so both held one message.
        for entry in purges {
            assert_eq!(entry.outcome.as_deref(), Ok("purged 1"));
        }
    }

    #[tokio::test]
    async fn test_failed_queue_delete_still_deletes_exchanges() {
        let broker = MockBroker::new();
        let topo = topology::build(&broker, &config()).await.unwrap();
        broker.fail_delete_queue("test-queue-0");

        let report = reclaim(&broker, &topo).await;

        assert!(!report.is_clean());
        assert_eq!(report.failure_count(), 1);
        assert!(broker.exchange_names().is_empty());
        assert_eq!(broker.queue_names(), vec!["test-queue-0"]);

        let failed: Vec<_> = report.failures().collect();
        assert_eq!(failed[0].entity, "test-queue-0");
        assert_eq!(failed[0].operation, ReclaimOp::DeleteQueue);
    }
}
