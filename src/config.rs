//! Load test configuration and named profiles.

use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::ValueEnum;

/// Parameters for one load test run.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub duration: Duration,
    pub queue_count: usize,
    pub exchange_count: usize,
    pub routing_key_count: usize,
    pub message_size: usize,
    pub parallel_clients: usize,
}

impl LoadConfig {
    /// Rejects parameter combinations that cannot produce a meaningful run.
    /// Called before any broker work starts.
    pub fn validate(&self) -> Result<()> {
        if self.duration.is_zero() {
            return Err(anyhow!("duration must be > 0"));
        }
        if self.queue_count == 0 {
            return Err(anyhow!("queue count must be > 0"));
        }
        if self.exchange_count == 0 {
            return Err(anyhow!("exchange count must be > 0"));
        }
        if self.routing_key_count == 0 {
            return Err(anyhow!("routing key count must be > 0"));
        }
        if self.message_size == 0 {
            return Err(anyhow!("message size must be > 0"));
        }
        if self.parallel_clients == 0 {
            return Err(anyhow!("parallel clients must be > 0"));
        }
        Ok(())
    }
}

/// Preset parameter sets. Explicit flags override individual fields.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Light load, sanity check
    Light,
    /// Medium load, typical workload
    Medium,
    /// Heavy load, stress test
    Heavy,
    /// Sustained load, long-running stability test
    Sustained,
}

impl Profile {
    pub fn config(self) -> LoadConfig {
        match self {
            Profile::Light => LoadConfig {
                duration: Duration::from_secs(30),
                queue_count: 5,
                exchange_count: 2,
                routing_key_count: 3,
                message_size: 1024,
                parallel_clients: 2,
            },
            Profile::Medium => LoadConfig {
                duration: Duration::from_secs(120),
                queue_count: 20,
                exchange_count: 5,
                routing_key_count: 10,
                message_size: 4096,
                parallel_clients: 10,
            },
            Profile::Heavy => LoadConfig {
                duration: Duration::from_secs(180),
                queue_count: 50,
                exchange_count: 20,
                routing_key_count: 30,
                message_size: 8192,
                parallel_clients: 20,
            },
            Profile::Sustained => LoadConfig {
                duration: Duration::from_secs(600),
                queue_count: 30,
                exchange_count: 10,
                routing_key_count: 15,
                message_size: 2048,
                parallel_clients: 15,
            },
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Profile::Light => "Light load - sanity check (2.5K-5K msgs/sec expected)",
            Profile::Medium => "Medium load - typical workload (20K-50K msgs/sec expected)",
            Profile::Heavy => "Heavy load - stress test (100K+ msgs/sec expected)",
            Profile::Sustained => "Sustained load - stability test (long-running)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> LoadConfig {
        LoadConfig {
            duration: Duration::from_secs(2),
            queue_count: 2,
            exchange_count: 2,
            routing_key_count: 2,
            message_size: 64,
            parallel_clients: 1,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_zero_counts_rejected() {
        let mut config = valid_config();
        config.queue_count = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.exchange_count = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.routing_key_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_duration_and_clients_rejected() {
        let mut config = valid_config();
        config.duration = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.parallel_clients = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.message_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_profiles_are_valid() {
        for profile in [
            Profile::Light,
            Profile::Medium,
            Profile::Heavy,
            Profile::Sustained,
        ] {
            assert!(profile.config().validate().is_ok());
        }
    }
}
