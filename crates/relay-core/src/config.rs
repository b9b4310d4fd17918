//! Relay engine configuration. Fixed for the lifetime of the process.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,
    #[error("dispatch tick interval must be greater than zero")]
    ZeroTickInterval,
    #[error("heartbeat interval must be greater than zero")]
    ZeroHeartbeatInterval,
    #[error("heartbeat timeout must be greater than zero")]
    ZeroHeartbeatTimeout,
    #[error("per-connection send queue must hold at least 1 frame")]
    ZeroSendQueue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Minimum gap between two accepted commands from one submitter.
    pub cooldown_ms: u64,
    /// Maximum number of pending commands.
    pub queue_capacity: usize,
    /// Period of the dispatch loop.
    pub tick_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 1000,
            queue_capacity: 10,
            tick_interval_ms: 500,
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
