//! Registry configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the agent registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Interval between background health probe rounds.
    pub health_check_interval_ms: u64,
    /// Budget for a single agent health probe.
    pub health_check_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            health_check_interval_ms: 30_000,
            health_check_timeout_ms: 5_000,
        }
    }
}

impl RegistryConfig {
    /// Returns the health probe interval.
    #[must_use]
    pub const fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    /// Returns the per-probe timeout.
    #[must_use]
    pub const fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }
}
