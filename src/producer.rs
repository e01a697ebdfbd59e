//! Producer worker.
//!
//! Each producer owns one assigned subset of exchanges and publishes a
//! fixed-size random payload in a hot loop until the deadline or the
//! cancellation signal. Payload size is the variable under test; the bytes
//! themselves are generated once per worker and reused.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::broker::Broker;
use crate::counters::RunCounters;
use crate::topology::Topology;

pub async fn run_worker(
    id: usize,
    broker: Arc<dyn Broker>,
    exchanges: Vec<String>,
    topology: Arc<Topology>,
    message_size: usize,
    counters: Arc<RunCounters>,
    token: CancellationToken,
    deadline: Instant,
) {
    if exchanges.is_empty() {
        warn!(producer = id, "no exchanges assigned, producer exiting");
        return;
    }
    let channel = match broker.open_channel().await {
        Ok(channel) => channel,
        Err(e) => {
            error!(producer = id, error = %e, "failed to open channel");
            return;
        }
    };

    let mut payload = vec![0u8; message_size];
    rand::thread_rng().fill(payload.as_mut_slice());

    info!(producer = id, exchanges = ?exchanges, "producer started");

    loop {
        if token.is_cancelled() || Instant::now() >= deadline {
            break;
        }
        let Some((exchange, routing_key)) = pick_target(&exchanges, &topology.keys_by_exchange)
        else {
            // Exchange with no usable keys; skip the iteration but stay
            // responsive to cancellation.
            tokio::task::yield_now().await;
            continue;
        };
        match channel.publish(&exchange, &routing_key, &payload).await {
            Ok(()) => counters.record_sent(),
            Err(e) => {
                warn!(producer = id, error = %e, "publish failed");
            }
        }
    }

    info!(producer = id, "producer finished");
}

fn pick_target(
    exchanges: &[String],
    keys_by_exchange: &HashMap<String, Vec<String>>,
) -> Option<(String, String)> {
    let mut rng = rand::thread_rng();
    let exchange = &exchanges[rng.gen_range(0..exchanges.len())];
    let keys = keys_by_exchange.get(exchange)?;
    if keys.is_empty() {
        return None;
    }
    let key = &keys[rng.gen_range(0..keys.len())];
    Some((exchange.clone(), key.clone()))
}
