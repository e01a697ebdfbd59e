//! Consumer worker.
//!
//! One subroutine per assigned queue, run concurrently and joined before
//! the worker returns. Each subroutine consumes with auto-ack under a
//! moderate prefetch until the deadline or the cancellation signal, then
//! drains the residual backlog under a raised prefetch until the queue has
//! been idle for [`DRAIN_IDLE_TIMEOUT`]. The drain exists because messages
//! published just before shutdown may still be in flight; counting them
//! keeps the receive statistics honest and empties the queue before the
//! reclaimer purges it.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::broker::Broker;
use crate::counters::RunCounters;

const ACTIVE_PREFETCH: u16 = 100;
const DRAIN_PREFETCH: u16 = 500;
const DRAIN_IDLE_TIMEOUT: Duration = Duration::from_millis(500);

pub async fn run_worker(
    id: usize,
    broker: Arc<dyn Broker>,
    queues: Vec<String>,
    counters: Arc<RunCounters>,
    token: CancellationToken,
    deadline: Instant,
) {
    info!(consumer = id, queues = ?queues, "consumer started");
    let mut tasks = JoinSet::new();
    for queue in queues {
        let broker = Arc::clone(&broker);
        let counters = Arc::clone(&counters);
        let token = token.clone();
        tasks.spawn(run_queue(broker, queue, counters, token, deadline));
    }
    while tasks.join_next().await.is_some() {}
    info!(consumer = id, "consumer finished");
}

async fn run_queue(
    broker: Arc<dyn Broker>,
    queue: String,
    counters: Arc<RunCounters>,
    token: CancellationToken,
    deadline: Instant,
) {
    let channel = match broker.open_channel().await {
        Ok(channel) => channel,
        Err(e) => {
            error!(queue = %queue, error = %e, "failed to open channel");
            return;
        }
    };

    if !token.is_cancelled() && Instant::now() < deadline {
        let mut stream = match channel.consume(&queue, ACTIVE_PREFETCH).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(queue = %queue, error = %e, "failed to consume");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!(queue = %queue, "stop signal received, draining");
                    break;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    info!(queue = %queue, "deadline reached, draining");
                    break;
                }
                delivery = stream.next() => match delivery {
                    Some(_) => counters.record_received(),
                    None => {
                        info!(queue = %queue, "delivery stream closed");
                        return;
                    }
                }
            }
        }
    }

    drain(channel.as_ref(), &queue, &counters).await;
}

/// Re-subscribes at a higher prefetch and counts deliveries until the queue
/// stays idle for [`DRAIN_IDLE_TIMEOUT`].
async fn drain(channel: &dyn Broker, queue: &str, counters: &RunCounters) {
    let mut stream = match channel.consume(queue, DRAIN_PREFETCH).await {
        Ok(stream) => stream,
        Err(e) => {
            error!(queue = %queue, error = %e, "failed to re-subscribe for draining");
            return;
        }
    };
    let mut drained = 0u64;
    loop {
        match tokio::time::timeout(DRAIN_IDLE_TIMEOUT, stream.next()).await {
            Ok(Some(_)) => {
                counters.record_received();
                drained += 1;
            }
            // Stream closed or idle timeout elapsed: the queue is as empty
            // as it is going to get.
            Ok(None) | Err(_) => break,
        }
    }
    info!(queue = %queue, drained, "queue drain completed");
}
