//! Bus health and counters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Back-pressure signal derived from the number of pending requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusHealthStatus {
    /// Below the degraded threshold.
    Healthy,
    /// At or above the degraded threshold; callers should slow down.
    Degraded,
    /// At or above the unhealthy threshold; callers should stop issuing requests.
    Unhealthy,
}

impl BusHealthStatus {
    /// Classifies a pending request count against the two thresholds.
    #[must_use]
    pub const fn classify(pending: usize, degraded_at: usize, unhealthy_at: usize) -> Self {
        if pending >= unhealthy_at {
            Self::Unhealthy
        } else if pending >= degraded_at {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }

    /// Returns the canonical representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for BusHealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time health report of the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusHealth {
    /// Overall status.
    pub status: BusHealthStatus,
    /// Requests still waiting for a reply.
    pub pending_requests: usize,
    /// Registered handlers across all message types.
    pub subscriptions: usize,
    /// Messages currently held in history.
    pub history_len: usize,
}

/// Monotonic counters maintained by the bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    /// Messages accepted by `publish`.
    pub published: u64,
    /// Handler invocations started.
    pub deliveries: u64,
    /// Handler invocations that failed or panicked.
    pub handler_failures: u64,
    /// Requests resolved by a reply.
    pub requests_resolved: u64,
    /// Requests abandoned after their timeout.
    pub requests_timed_out: u64,
}
