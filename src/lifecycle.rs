//! Run orchestration.
//!
//! Phases in strict order: provision the topology, launch the workers,
//! wait for the deadline or an interrupt, join every worker, print the
//! statistics, then reclaim the topology. The deadline and the interrupt
//! cancel the same shared token; cancelling an already-cancelled token is
//! a no-op, so a second trigger never double-fires shutdown.

use std::sync::Arc;
use std::time::Instant as WallInstant;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::broker::Broker;
use crate::config::LoadConfig;
use crate::counters::RunCounters;
use crate::reclaim::{self, ReclaimReport};
use crate::stats::Statistics;
use crate::{assign, consumer, producer, topology};

/// Runs the load test end to end, reacting to SIGINT or SIGTERM like a
/// deadline expiry. Reclaim failures are reported but never fail the run.
pub async fn run(broker: Arc<dyn Broker>, config: LoadConfig) -> Result<Statistics> {
    let token = CancellationToken::new();
    let signal_token = token.clone();
    let signal_task = tokio::spawn(async move {
        wait_for_termination().await;
        info!("termination signal received, stopping load test");
        signal_token.cancel();
    });

    let result = execute(broker, config, token).await;
    signal_task.abort();
    result.map(|(stats, _report)| stats)
}

/// Resolves once the process is asked to stop: Ctrl-C everywhere, plus
/// SIGTERM on unix.
async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM, falling back to Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// The full pipeline minus signal handling; shutdown can be forced through
/// `token` by the caller.
pub async fn execute(
    broker: Arc<dyn Broker>,
    config: LoadConfig,
    token: CancellationToken,
) -> Result<(Statistics, ReclaimReport)> {
    config.validate()?;

    let started = WallInstant::now();
    let topology = Arc::new(
        topology::build(broker.as_ref(), &config)
            .await
            .context("failed to provision topology")?,
    );

    let counters = Arc::new(RunCounters::default());
    let deadline = Instant::now() + config.duration;

    // The deadline broadcasts through the same token as the interrupt.
    let deadline_token = token.clone();
    let deadline_task = tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        info!("duration expired, stopping load test");
        deadline_token.cancel();
    });

    let mut workers = JoinSet::new();

    info!("starting consumers");
    let queue_buckets = assign::round_robin(&topology.queues, config.parallel_clients);
    for (id, queues) in queue_buckets.into_iter().enumerate() {
        workers.spawn(consumer::run_worker(
            id,
            Arc::clone(&broker),
            queues,
            Arc::clone(&counters),
            token.clone(),
            deadline,
        ));
    }

    info!("starting producers");
    let exchange_buckets = assign::round_robin(&topology.exchanges, config.parallel_clients);
    for (id, exchanges) in exchange_buckets.into_iter().enumerate() {
        workers.spawn(producer::run_worker(
            id,
            Arc::clone(&broker),
            exchanges,
            Arc::clone(&topology),
            config.message_size,
            Arc::clone(&counters),
            token.clone(),
            deadline,
        ));
    }

    info!("waiting for all workers to finish");
    while workers.join_next().await.is_some() {}
    deadline_task.abort();
    info!("all producers and consumers stopped");

    let stats = Statistics::compute(
        &config,
        counters.sent(),
        counters.received(),
        started.elapsed(),
    );
    println!("{stats}");

    info!("starting cleanup");
    let report = reclaim::reclaim(broker.as_ref(), &topology).await;

    Ok((stats, report))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::broker::mock::MockBroker;

    fn config(duration: Duration) -> LoadConfig {
        LoadConfig {
            duration,
            queue_count: 2,
            exchange_count: 2,
            routing_key_count: 2,
            message_size: 64,
            parallel_clients: 1,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_full_run_fans_out_to_every_queue_and_cleans_up() {
        let broker = MockBroker::new();
        let token = CancellationToken::new();

        let (stats, report) = execute(
            Arc::new(broker.clone()),
            config(Duration::from_millis(100)),
            token,
        )
        .await
        .unwrap();

        assert!(stats.sent_messages > 0);
        // Full fan-out on a direct exchange delivers one copy per queue.
        assert_eq!(stats.received_messages, stats.sent_messages * 2);
        assert!((stats.duplication_factor - 2.0).abs() < 1e-9);
        assert!(report.is_clean());
        assert!(broker.queue_names().is_empty());
        assert!(broker.exchange_names().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancelling_twice_is_idempotent() {
        let broker = MockBroker::new();
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
            trigger.cancel();
        });

        let (stats, report) = execute(
            Arc::new(broker.clone()),
            config(Duration::from_secs(60)),
            token,
        )
        .await
        .unwrap();

        // Interrupted long before the deadline; the run still reports and
        // reclaims normally.
        assert!(stats.actual_duration < Duration::from_secs(30));
        assert_eq!(stats.received_messages, stats.sent_messages * 2);
        assert!(report.is_clean());
        assert!(broker.queue_names().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_sigterm_stops_the_run_and_cleans_up() {
        let broker = MockBroker::new();
        let handle = tokio::spawn(run(
            Arc::new(broker.clone()),
            config(Duration::from_secs(60)),
        ));

        // Let the signal listener install its handler before raising.
        tokio::time::sleep(Duration::from_millis(200)).await;
        unsafe { libc::raise(libc::SIGTERM) };

        let stats = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("run did not stop after SIGTERM")
            .unwrap()
            .unwrap();

        // Stopped long before the deadline; reporting and reclaim still ran.
        assert!(stats.actual_duration < Duration::from_secs(30));
        assert_eq!(stats.received_messages, stats.sent_messages * 2);
        assert!(broker.queue_names().is_empty());
        assert!(broker.exchange_names().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_aborts_before_any_broker_work() {
        let broker = MockBroker::new();
        let mut bad = config(Duration::from_secs(1));
        bad.queue_count = 0;

        let result = execute(Arc::new(broker.clone()), bad, CancellationToken::new()).await;

        assert!(result.is_err());
        assert!(broker.exchange_names().is_empty());
        assert!(broker.queue_names().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_queue_delete_failure_does_not_fail_the_run() {
        let broker = MockBroker::new();
        broker.fail_delete_queue("test-queue-1");
        let token = CancellationToken::new();

        let (_stats, report) = execute(
            Arc::new(broker.clone()),
            config(Duration::from_millis(50)),
            token,
        )
        .await
        .unwrap();

        assert_eq!(report.failure_count(), 1);
        assert!(broker.exchange_names().is_empty());
    }
}
