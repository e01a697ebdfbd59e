//! Run statistics.
//!
//! Pure computation over the two counters and the wall clock; nothing here
//! feeds back into control decisions. The duplication factor is the average
//! number of deliveries observed per published message (received / sent);
//! with the full fan-out binding scheme on direct exchanges it converges to
//! the queue count, since each publish matches exactly one binding per
//! queue.

use std::fmt;
use std::time::Duration;

use crate::config::LoadConfig;

const MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone)]
pub struct Statistics {
    pub expected_duration: Duration,
    pub actual_duration: Duration,
    pub sent_messages: u64,
    pub received_messages: u64,
    pub queue_count: usize,
    pub exchange_count: usize,
    pub routing_key_count: usize,
    pub message_size: usize,
    pub parallel_clients: usize,
    pub send_rate: f64,
    pub receive_rate: f64,
    pub duplication_factor: f64,
    pub data_sent_mb: f64,
    pub data_received_mb: f64,
    pub data_sent_mb_per_sec: f64,
    pub data_received_mb_per_sec: f64,
    pub time_multiplier: f64,
}

impl Statistics {
    pub fn compute(
        config: &LoadConfig,
        sent_messages: u64,
        received_messages: u64,
        actual_duration: Duration,
    ) -> Self {
        let seconds = actual_duration.as_secs_f64().max(0.001);
        let expected_seconds = config.duration.as_secs_f64().max(0.001);

        let data_sent = sent_messages as f64 * config.message_size as f64;
        let data_received = received_messages as f64 * config.message_size as f64;

        let duplication_factor = if sent_messages == 0 {
            0.0
        } else {
            received_messages as f64 / sent_messages as f64
        };

        Self {
            expected_duration: config.duration,
            actual_duration,
            sent_messages,
            received_messages,
            queue_count: config.queue_count,
            exchange_count: config.exchange_count,
            routing_key_count: config.routing_key_count,
            message_size: config.message_size,
            parallel_clients: config.parallel_clients,
            send_rate: sent_messages as f64 / seconds,
            receive_rate: received_messages as f64 / seconds,
            duplication_factor,
            data_sent_mb: data_sent / MB,
            data_received_mb: data_received / MB,
            data_sent_mb_per_sec: data_sent / (MB * seconds),
            data_received_mb_per_sec: data_received / (MB * seconds),
            time_multiplier: seconds / expected_seconds,
        }
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = "=".repeat(70);
        writeln!(f)?;
        writeln!(f, "{separator}")?;
        writeln!(f, "                    LOAD TEST STATISTICS                         ")?;
        writeln!(f, "{separator}")?;
        writeln!(f)?;
        writeln!(f, "Test Configuration:")?;
        writeln!(
            f,
            "  - Expected Duration:     {:.2} seconds",
            self.expected_duration.as_secs_f64()
        )?;
        writeln!(
            f,
            "  - Actual Duration:       {:.2} seconds",
            self.actual_duration.as_secs_f64()
        )?;
        writeln!(f, "  - Time Multiplier:       {:.2} x", self.time_multiplier)?;
        writeln!(f, "  - Queues:                {} (type: quorum)", self.queue_count)?;
        writeln!(f, "  - Exchanges:             {}", self.exchange_count)?;
        writeln!(f, "  - Routing Keys:          {}", self.routing_key_count)?;
        writeln!(f, "  - Message Size:          {} bytes", self.message_size)?;
        writeln!(
            f,
            "  - Parallel Clients:      {} (consumers + producers)",
            self.parallel_clients
        )?;
        writeln!(f)?;
        writeln!(f, "Message Statistics:")?;
        writeln!(f, "  - Messages Sent:         {}", self.sent_messages)?;
        writeln!(f, "  - Messages Received:     {}", self.received_messages)?;
        writeln!(f, "  - Duplication Factor:    {:.2} x", self.duplication_factor)?;
        writeln!(f)?;
        writeln!(f, "Throughput:")?;
        writeln!(f, "  - Send Rate:             {:.2} msgs/sec", self.send_rate)?;
        writeln!(f, "  - Receive Rate:          {:.2} msgs/sec", self.receive_rate)?;
        writeln!(f)?;
        writeln!(f, "Data Transfer:")?;
        writeln!(f, "  - Total Data Sent:       {:.2} MB", self.data_sent_mb)?;
        writeln!(f, "  - Total Data Received:   {:.2} MB", self.data_received_mb)?;
        writeln!(f, "  - Send Rate:             {:.2} MB/s", self.data_sent_mb_per_sec)?;
        writeln!(
            f,
            "  - Receive Rate:          {:.2} MB/s",
            self.data_received_mb_per_sec
        )?;
        writeln!(f)?;
        write!(f, "{separator}")
    }
}
