//! Shared run counters.
//!
//! The two counters are the only state mutated concurrently by the worker
//! tasks. They are incremented exactly once per successful publish/delivery
//! and only ever read back for the final report.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic sent/received counters shared by all producer and consumer tasks.
#[derive(Debug, Default)]
pub struct RunCounters {
    sent: AtomicU64,
    received: AtomicU64,
}

impl RunCounters {
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters_start_at_zero() {
        let counters = RunCounters::default();
        assert_eq!(counters.sent(), 0);
        assert_eq!(counters.received(), 0);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let counters = Arc::new(RunCounters::default());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let counters = Arc::clone(&counters);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    counters.record_sent();
                    counters.record_received();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counters.sent(), 8000);
        assert_eq!(counters.received(), 8000);
    }
}
