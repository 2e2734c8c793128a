//! Durable queue backend port.

use crate::pipeline::domain::{Job, JobCounts, JobId, JobKind, JobStatus};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for queue backend operations.
pub type QueueBackendResult<T> = Result<T, QueueBackendError>;

/// Opaque proof that a worker holds a job's lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseToken(u64);

impl LeaseToken {
    /// Wraps a backend-issued token value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw token value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// A dequeued job together with its lease.
#[derive(Debug, Clone)]
pub struct Lease {
    /// The job, already marked active.
    pub job: Job,
    /// Token required to renew, ack or nack the job.
    pub token: LeaseToken,
}

/// Errors returned by queue backends.
#[derive(Debug, Clone, Error)]
pub enum QueueBackendError {
    /// A job with the same identifier is already stored.
    #[error("duplicate job identifier: {0}")]
    DuplicateJob(JobId),

    /// No job with the identifier exists.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// The caller's lease expired or was reassigned.
    #[error("lease lost for job {0}")]
    LeaseLost(JobId),

    /// The job cannot be removed while a worker holds it.
    #[error("job {0} is active")]
    JobActive(JobId),

    /// Storage failure.
    #[error("queue persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl QueueBackendError {
    /// Wraps a storage error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

/// At-least-once job store.
///
/// A dequeued job is leased to one worker. If the lease is neither renewed
/// nor settled before it expires, [`QueueBackend::reclaim_expired`] hands
/// the job back to the queue; a late `ack` or `nack` from the original
/// worker then fails with [`QueueBackendError::LeaseLost`].
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Stores a new job.
    ///
    /// # Errors
    ///
    /// Returns [`QueueBackendError::DuplicateJob`] if the identifier is
    /// already stored, or a persistence error.
    async fn enqueue(&self, job: Job) -> QueueBackendResult<()>;

    /// Leases the next ready job of `kind` for `lease`.
    ///
    /// Ready jobs are ordered by priority (lower first), then by insertion.
    /// Delayed jobs whose delay elapsed count as ready.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the store cannot be read.
    async fn dequeue(&self, kind: JobKind, lease: Duration) -> QueueBackendResult<Option<Lease>>;

    /// Renews a held lease.
    ///
    /// # Errors
    ///
    /// Returns [`QueueBackendError::LeaseLost`] when `token` no longer holds
    /// the job.
    async fn extend_lease(
        &self,
        job_id: JobId,
        token: LeaseToken,
        lease: Duration,
    ) -> QueueBackendResult<()>;

    /// Settles a job as completed, releasing its lease.
    ///
    /// # Errors
    ///
    /// Returns [`QueueBackendError::LeaseLost`] when `token` no longer holds
    /// the job.
    async fn ack(
        &self,
        job_id: JobId,
        token: LeaseToken,
        result: Value,
        remove: bool,
    ) -> QueueBackendResult<Job>;

    /// Records a failed attempt, releasing the lease.
    ///
    /// With `retry_after` the job is requeued once the delay elapses;
    /// without it the job fails terminally (and is dropped when `remove`
    /// is set).
    ///
    /// # Errors
    ///
    /// Returns [`QueueBackendError::LeaseLost`] when `token` no longer holds
    /// the job.
    async fn nack(
        &self,
        job_id: JobId,
        token: LeaseToken,
        error: String,
        retry_after: Option<Duration>,
        remove: bool,
    ) -> QueueBackendResult<Job>;

    /// Reclaims active jobs of `kind` whose lease expired.
    ///
    /// Each reclaimed job is charged one attempt; it returns to `Waiting`
    /// while attempts remain and fails terminally otherwise. Returns the
    /// reclaimed jobs in their new state.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the store cannot be updated.
    async fn reclaim_expired(&self, kind: JobKind) -> QueueBackendResult<Vec<Job>>;

    /// Removes a job that is not active.
    ///
    /// # Errors
    ///
    /// Returns [`QueueBackendError::JobActive`] while a worker holds the
    /// job.
    async fn remove(&self, job_id: JobId) -> QueueBackendResult<Option<Job>>;

    /// Looks a job up by identifier.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the store cannot be read.
    async fn find(&self, job_id: JobId) -> QueueBackendResult<Option<Job>>;

    /// Counts jobs of `kind` by status.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the store cannot be read.
    async fn counts(&self, kind: JobKind) -> QueueBackendResult<JobCounts>;

    /// Removes up to `limit` terminal jobs of `kind` that finished more than
    /// `older_than` ago, optionally only those in `status`.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the store cannot be updated.
    async fn clean(
        &self,
        kind: JobKind,
        older_than: Duration,
        limit: usize,
        status: Option<JobStatus>,
    ) -> QueueBackendResult<Vec<JobId>>;
}
