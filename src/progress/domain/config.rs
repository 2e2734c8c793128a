//! Aggregator configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retention settings for finished evaluations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// How long a terminal snapshot stays queryable.
    pub retention_ms: u64,
    /// Interval between retention sweeps.
    pub cleanup_interval_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            retention_ms: 3_600_000,
            cleanup_interval_ms: 60_000,
        }
    }
}

impl ProgressConfig {
    /// Returns the retention window.
    #[must_use]
    pub const fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    /// Returns the sweep interval.
    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}
