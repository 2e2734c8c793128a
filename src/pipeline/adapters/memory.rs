//! In-memory queue backend.

use crate::clock::elapsed_between;
use crate::pipeline::domain::{Job, JobCounts, JobId, JobKind, JobStatus};
use crate::pipeline::ports::{
    Lease, LeaseToken, QueueBackend, QueueBackendError, QueueBackendResult,
};
use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;

const STALLED_REASON: &str = "job stalled: lease expired";

struct StoredJob {
    job: Job,
    sequence: u64,
    ready_at: Option<Instant>,
    lease: Option<(LeaseToken, Instant)>,
}

impl StoredJob {
    fn is_ready(&self, now: Instant) -> bool {
        match self.job.status() {
            JobStatus::Waiting => true,
            JobStatus::Delayed => self.ready_at.is_none_or(|at| at <= now),
            JobStatus::Active | JobStatus::Completed | JobStatus::Failed => false,
        }
    }

    fn holds(&self, token: LeaseToken) -> bool {
        self.job.status() == JobStatus::Active
            && self.lease.is_some_and(|(held, _)| held == token)
    }
}

#[derive(Default)]
struct MemoryQueueState {
    jobs: HashMap<JobId, StoredJob>,
    next_sequence: u64,
    next_token: u64,
}

impl MemoryQueueState {
    fn leased(&mut self, job_id: JobId, token: LeaseToken) -> QueueBackendResult<&mut StoredJob> {
        let stored = self
            .jobs
            .get_mut(&job_id)
            .ok_or(QueueBackendError::NotFound(job_id))?;
        if stored.holds(token) {
            Ok(stored)
        } else {
            Err(QueueBackendError::LeaseLost(job_id))
        }
    }
}

/// Thread-safe in-memory queue backend.
///
/// Lease expiry is measured on the tokio clock so tests can pause time.
/// Lease tokens are authoritative: a worker keeps its lease past expiry
/// until [`QueueBackend::reclaim_expired`] actually reassigns the job.
#[derive(Clone)]
pub struct InMemoryQueueBackend {
    state: Arc<RwLock<MemoryQueueState>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl InMemoryQueueBackend {
    /// Creates an empty backend using the system clock for timestamps.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(DefaultClock))
    }

    /// Creates an empty backend stamping jobs with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryQueueState::default())),
            clock,
        }
    }

    /// Returns the number of stored jobs across every queue.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the state lock is poisoned.
    pub fn len(&self) -> QueueBackendResult<usize> {
        Ok(self.read()?.jobs.len())
    }

    /// Returns whether no job is stored.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the state lock is poisoned.
    pub fn is_empty(&self) -> QueueBackendResult<bool> {
        Ok(self.read()?.jobs.is_empty())
    }

    fn read(&self) -> QueueBackendResult<RwLockReadGuard<'_, MemoryQueueState>> {
        self.state
            .read()
            .map_err(|err| QueueBackendError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> QueueBackendResult<RwLockWriteGuard<'_, MemoryQueueState>> {
        self.state
            .write()
            .map_err(|err| QueueBackendError::persistence(std::io::Error::other(err.to_string())))
    }
}

impl Default for InMemoryQueueBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryQueueBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryQueueBackend").finish_non_exhaustive()
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueueBackend {
    async fn enqueue(&self, job: Job) -> QueueBackendResult<()> {
        let mut guard = self.write()?;
        let state = &mut *guard;
        let job_id = job.id();
        if state.jobs.contains_key(&job_id) {
            return Err(QueueBackendError::DuplicateJob(job_id));
        }
        let ready_at = (job.status() == JobStatus::Delayed)
            .then(|| Instant::now() + job.options().delay());
        state.jobs.insert(
            job_id,
            StoredJob {
                job,
                sequence: state.next_sequence,
                ready_at,
                lease: None,
            },
        );
        state.next_sequence = state.next_sequence.saturating_add(1);
        Ok(())
    }

    async fn dequeue(&self, kind: JobKind, lease: Duration) -> QueueBackendResult<Option<Lease>> {
        let now = Instant::now();
        let mut guard = self.write()?;
        let state = &mut *guard;
        let next = state
            .jobs
            .iter()
            .filter(|(_, stored)| stored.job.kind() == kind && stored.is_ready(now))
            .min_by_key(|(_, stored)| (stored.job.options().priority, stored.sequence))
            .map(|(job_id, _)| *job_id);
        let Some(job_id) = next else {
            return Ok(None);
        };
        let Some(stored) = state.jobs.get_mut(&job_id) else {
            return Ok(None);
        };

        let token = LeaseToken::new(state.next_token);
        state.next_token = state.next_token.saturating_add(1);
        stored.job.promote();
        stored.job.start(self.clock.utc());
        stored.ready_at = None;
        stored.lease = Some((token, now + lease));
        Ok(Some(Lease {
            job: stored.job.clone(),
            token,
        }))
    }

    async fn extend_lease(
        &self,
        job_id: JobId,
        token: LeaseToken,
        lease: Duration,
    ) -> QueueBackendResult<()> {
        let mut state = self.write()?;
        let stored = state.leased(job_id, token)?;
        stored.lease = Some((token, Instant::now() + lease));
        Ok(())
    }

    async fn ack(
        &self,
        job_id: JobId,
        token: LeaseToken,
        result: Value,
        remove: bool,
    ) -> QueueBackendResult<Job> {
        let now = self.clock.utc();
        let mut state = self.write()?;
        let stored = state.leased(job_id, token)?;
        stored.job.complete(result, now);
        stored.lease = None;
        let job = stored.job.clone();
        if remove {
            state.jobs.remove(&job_id);
        }
        Ok(job)
    }

    async fn nack(
        &self,
        job_id: JobId,
        token: LeaseToken,
        error: String,
        retry_after: Option<Duration>,
        remove: bool,
    ) -> QueueBackendResult<Job> {
        let now = self.clock.utc();
        let mut state = self.write()?;
        let stored = state.leased(job_id, token)?;
        stored.lease = None;
        if let Some(delay) = retry_after {
            stored.job.record_failure(error, true, !delay.is_zero(), now);
            stored.ready_at = Some(Instant::now() + delay);
        } else {
            stored.job.record_failure(error, false, false, now);
        }
        let job = stored.job.clone();
        if remove && job.status() == JobStatus::Failed {
            state.jobs.remove(&job_id);
        }
        Ok(job)
    }

    async fn reclaim_expired(&self, kind: JobKind) -> QueueBackendResult<Vec<Job>> {
        let now = Instant::now();
        let at = self.clock.utc();
        let mut state = self.write()?;
        let mut reclaimed = Vec::new();
        for stored in state.jobs.values_mut() {
            let expired = stored.job.kind() == kind
                && stored.job.status() == JobStatus::Active
                && stored.lease.is_some_and(|(_, expires_at)| expires_at <= now);
            if !expired {
                continue;
            }
            let retry = stored.job.attempts_made().saturating_add(1) < stored.job.options().attempts;
            stored.lease = None;
            stored.ready_at = None;
            stored.job.record_failure(STALLED_REASON, retry, false, at);
            reclaimed.push(stored.job.clone());
        }
        for job in &reclaimed {
            if job.status() == JobStatus::Failed && job.options().remove_on_fail {
                state.jobs.remove(&job.id());
            }
        }
        Ok(reclaimed)
    }

    async fn remove(&self, job_id: JobId) -> QueueBackendResult<Option<Job>> {
        let mut state = self.write()?;
        if state
            .jobs
            .get(&job_id)
            .is_some_and(|stored| stored.job.status() == JobStatus::Active)
        {
            return Err(QueueBackendError::JobActive(job_id));
        }
        Ok(state.jobs.remove(&job_id).map(|stored| stored.job))
    }

    async fn find(&self, job_id: JobId) -> QueueBackendResult<Option<Job>> {
        Ok(self.read()?.jobs.get(&job_id).map(|stored| stored.job.clone()))
    }

    async fn counts(&self, kind: JobKind) -> QueueBackendResult<JobCounts> {
        let state = self.read()?;
        let mut counts = JobCounts::default();
        for stored in state.jobs.values().filter(|stored| stored.job.kind() == kind) {
            counts.record(stored.job.status());
        }
        Ok(counts)
    }

    async fn clean(
        &self,
        kind: JobKind,
        older_than: Duration,
        limit: usize,
        status: Option<JobStatus>,
    ) -> QueueBackendResult<Vec<JobId>> {
        let now = self.clock.utc();
        let mut state = self.write()?;
        let mut candidates: Vec<_> = state
            .jobs
            .values()
            .filter(|stored| stored.job.kind() == kind)
            .filter(|stored| {
                let job_status = stored.job.status();
                job_status.is_terminal() && status.is_none_or(|wanted| wanted == job_status)
            })
            .filter_map(|stored| {
                stored
                    .job
                    .finished_at()
                    .filter(|finished| elapsed_between(*finished, now) >= older_than)
                    .map(|finished| (finished, stored.job.id()))
            })
            .collect();
        candidates.sort();
        if limit > 0 {
            candidates.truncate(limit);
        }
        let removed: Vec<JobId> = candidates.into_iter().map(|(_, job_id)| job_id).collect();
        for job_id in &removed {
            state.jobs.remove(job_id);
        }
        Ok(removed)
    }
}
