//! Queue lifecycle events.

use super::{JobId, JobKind, JobPayload};
use serde_json::Value;
use std::time::Duration;

/// Broadcast whenever a job changes state.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// The handler succeeded.
    Completed {
        /// Finished job.
        job_id: JobId,
        /// Job payload.
        payload: JobPayload,
        /// Handler return value.
        result: Value,
    },
    /// The job failed with no attempts left.
    Failed {
        /// Failed job.
        job_id: JobId,
        /// Job payload.
        payload: JobPayload,
        /// Last error.
        error: String,
        /// Attempts consumed.
        attempts_made: u32,
    },
    /// An attempt failed and the job was rescheduled.
    Retrying {
        /// Rescheduled job.
        job_id: JobId,
        /// Queue of the job.
        kind: JobKind,
        /// Failed attempts so far.
        attempts_made: u32,
        /// Backoff before the next attempt.
        delay: Duration,
        /// Error of the failed attempt.
        error: String,
    },
    /// A lease expired while the job was active.
    Stalled {
        /// Reclaimed job.
        job_id: JobId,
        /// Queue of the job.
        kind: JobKind,
    },
}

impl QueueEvent {
    /// Returns the job the event concerns.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        match self {
            Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Stalled { job_id, .. } => *job_id,
        }
    }

    /// Returns the queue the event concerns.
    #[must_use]
    pub const fn kind(&self) -> JobKind {
        match self {
            Self::Completed { payload, .. } | Self::Failed { payload, .. } => payload.kind(),
            Self::Retrying { kind, .. } | Self::Stalled { kind, .. } => *kind,
        }
    }

    /// Returns whether the job will not run again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}
