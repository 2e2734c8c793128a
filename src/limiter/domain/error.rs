//! Limiter errors.

use super::DenialReason;
use std::time::Duration;
use thiserror::Error;

/// Errors returned when a limiter decision is turned into a failure.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum LimiterError {
    /// A connection cap refused the connection.
    #[error("{0}")]
    ConnectionLimitExceeded(DenialReason),

    /// A message budget is spent.
    #[error("{reason}; retry in {}ms", .wait.as_millis())]
    RateLimitExceeded {
        /// Budget that was exceeded.
        reason: DenialReason,
        /// Time until the window frees a slot.
        wait: Duration,
    },

    /// The connection is not registered.
    #[error("connection not found")]
    UnknownConnection,
}

/// Result type for limiter operations.
pub type LimiterResult<T> = Result<T, LimiterError>;
