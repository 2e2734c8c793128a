//! Limiter configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection caps and message budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Connections a single user may hold.
    pub max_connections_per_user: usize,
    /// Connections the service may hold.
    pub max_total_connections: usize,
    /// Messages per connection in any one-second window.
    pub messages_per_second: u32,
    /// Messages per connection in any one-minute window.
    pub messages_per_minute: u32,
    /// Two violations closer than this raise the penalty counter.
    pub violation_window_ms: u64,
    /// Interval between cleanup sweeps.
    pub cleanup_interval_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_connections_per_user: 5,
            max_total_connections: 1_000,
            messages_per_second: 10,
            messages_per_minute: 100,
            violation_window_ms: 60_000,
            cleanup_interval_ms: 60_000,
        }
    }
}

impl LimiterConfig {
    /// Tight budgets for untrusted or anonymous subscribers.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_connections_per_user: 2,
            max_total_connections: 200,
            messages_per_second: 5,
            messages_per_minute: 30,
            ..Self::default()
        }
    }

    /// Returns the penalty escalation window.
    #[must_use]
    pub const fn violation_window(&self) -> Duration {
        Duration::from_millis(self.violation_window_ms)
    }

    /// Returns the cleanup interval.
    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}
