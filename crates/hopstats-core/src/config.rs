//! Configuration for snapshot emission.

use crate::HopStatsError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default minimum time between two snapshot emissions.
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 100;

/// Render scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Minimum interval between emissions, in milliseconds.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

fn default_min_interval_ms() -> u64 {
    DEFAULT_MIN_INTERVAL_MS
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
        }
    }
}

impl SchedulerConfig {
    pub fn new(min_interval_ms: u64) -> Self {
        Self { min_interval_ms }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), HopStatsError> {
        if self.min_interval_ms == 0 {
            return Err(HopStatsError::InvalidMinInterval(self.min_interval_ms));
        }
        Ok(())
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}
