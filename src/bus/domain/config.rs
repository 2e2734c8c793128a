//! Message bus configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the message bus.
///
/// # Examples
///
/// ```
/// use assay::bus::domain::BusConfig;
///
/// let config = BusConfig::default();
/// assert_eq!(config.history_limit, 1000);
/// assert_eq!(config.degraded_pending_threshold, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Number of most recent messages retained for introspection.
    pub history_limit: usize,
    /// Pending request count at which the bus reports `degraded`.
    pub degraded_pending_threshold: usize,
    /// Pending request count at which the bus reports `unhealthy`.
    pub unhealthy_pending_threshold: usize,
    /// Timeout applied by [`crate::bus::services::MessageBus::request_default`].
    pub default_request_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_limit: 1000,
            degraded_pending_threshold: 100,
            unhealthy_pending_threshold: 500,
            default_request_timeout_ms: 5_000,
        }
    }
}

impl BusConfig {
    /// Returns the default request timeout.
    #[must_use]
    pub const fn default_request_timeout(&self) -> Duration {
        Duration::from_millis(self.default_request_timeout_ms)
    }
}
