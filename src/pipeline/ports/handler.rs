//! Job handler port.

use crate::pipeline::domain::Job;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Result type returned by job handlers.
pub type JobHandlerResult = Result<Value, JobError>;

/// A failed job attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct JobError(pub String);

impl JobError {
    /// Creates an error from any displayable value.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Per-attempt context handed to a handler.
#[derive(Debug, Clone)]
pub struct JobContext {
    attempt: u32,
    cancellation: CancellationToken,
}

impl JobContext {
    /// Creates a context for attempt number `attempt` (0-based).
    #[must_use]
    pub const fn new(attempt: u32, cancellation: CancellationToken) -> Self {
        Self {
            attempt,
            cancellation,
        }
    }

    /// Returns how many attempts failed before this one.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the token cancelled when the job is cancelled or the queue
    /// closes.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns whether the attempt should stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Executes jobs of one queue.
///
/// Delivery is at-least-once, so implementations must tolerate running
/// the same job more than once.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Processes one attempt of `job`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError`] when the attempt fails; the queue retries or
    /// fails the job according to its options.
    async fn handle(&self, job: &Job, context: JobContext) -> JobHandlerResult;
}
