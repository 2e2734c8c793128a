//! Error types for the message bus.

use super::CorrelationId;
use std::time::Duration;
use thiserror::Error;

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Errors surfaced to callers of the bus.
///
/// Handler failures are deliberately absent: they are isolated per handler
/// and reported as `handler-error` messages instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// No reply arrived within the request budget.
    #[error("request {correlation_id} timed out after {timeout:?}")]
    RequestTimeout {
        /// Correlation identifier of the abandoned request.
        correlation_id: CorrelationId,
        /// Budget that elapsed.
        timeout: Duration,
    },

    /// The bus has been shut down.
    #[error("message bus has been shut down")]
    ShutDown,
}

/// Failure reported by a single message handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    /// Creates a handler error with a description.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Returns the failure description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Error returned while parsing a message type name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown message type: {0}")]
pub struct ParseMessageTypeError(pub String);
