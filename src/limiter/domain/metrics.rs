//! Limiter metrics.

use super::ConnectionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time limiter counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterMetrics {
    /// Live connections.
    pub active_connections: usize,
    /// Users holding at least one connection.
    pub active_users: usize,
    /// Connection attempts refused since start.
    pub rejected_connections: u64,
    /// Messages admitted since start.
    pub messages_admitted: u64,
    /// Rate-limit violations since start.
    pub total_violations: u64,
    /// Penalty counters per connection with repeated violations.
    pub penalties: BTreeMap<ConnectionId, u32>,
}

/// What a cleanup sweep reclaimed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Message timestamps older than the longest window.
    pub pruned_timestamps: usize,
    /// Window and violation entries of departed connections.
    pub stale_entries: usize,
}
