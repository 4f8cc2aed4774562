use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::constants::DEFAULT_RETRY_INTERVAL_MS;
use crate::constants::DEFAULT_WAIT_TIMEOUT_MS;
use crate::Result;

/// Wait budget for convergence checks
///
/// Tuning these through `HARNESS__POLL__TIMEOUT_MS` and
/// `HARNESS__POLL__INTERVAL_MS` lets slow CI machines wait longer
/// without touching test code.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct PollConfig {
    /// Total time a wait may take (milliseconds)
    /// Default: 30000
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Pause between two evaluations (milliseconds)
    /// Default: 500
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl PollConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Returns error if either value is zero or the interval exceeds the timeout
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(invalid("poll.timeout_ms must be greater than 0".into()));
        }
        if self.interval_ms == 0 {
            return Err(invalid("poll.interval_ms must be greater than 0".into()));
        }
        if self.interval_ms > self.timeout_ms {
            return Err(invalid(format!(
                "poll.interval_ms ({}) cannot exceed poll.timeout_ms ({})",
                self.interval_ms, self.timeout_ms
            )));
        }
        Ok(())
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_WAIT_TIMEOUT_MS
}
fn default_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}
