//! Jobs and their lifecycle.

use super::{JobId, JobKind, JobOptions, JobPayload, ParseJobStatusError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Ready to be dequeued.
    Waiting,
    /// Leased by a worker.
    Active,
    /// Finished successfully.
    Completed,
    /// Failed with no attempts left.
    Failed,
    /// Waiting for a delay or backoff to elapse.
    Delayed,
}

impl JobStatus {
    /// Returns the canonical status name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Delayed => "delayed",
        }
    }

    /// Returns whether the job will never run again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for JobStatus {
    type Error = ParseJobStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "waiting" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "delayed" => Ok(Self::Delayed),
            _ => Err(ParseJobStatusError(value.to_owned())),
        }
    }
}

/// A unit of work tracked by a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    payload: JobPayload,
    options: JobOptions,
    status: JobStatus,
    attempts_made: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failed_reason: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a job, delayed when `options` asks for an initial delay.
    #[must_use]
    pub fn new(payload: JobPayload, options: JobOptions, created_at: DateTime<Utc>) -> Self {
        let status = if options.delay_ms > 0 {
            JobStatus::Delayed
        } else {
            JobStatus::Waiting
        };
        Self {
            id: JobId::new(),
            payload,
            options,
            status,
            attempts_made: 0,
            result: None,
            failed_reason: None,
            created_at,
            processed_at: None,
            finished_at: None,
        }
    }

    /// Returns the job identifier.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Returns the queue the job belongs to.
    #[must_use]
    pub const fn kind(&self) -> JobKind {
        self.payload.kind()
    }

    /// Returns the job payload.
    #[must_use]
    pub const fn payload(&self) -> &JobPayload {
        &self.payload
    }

    /// Returns the enqueue options.
    #[must_use]
    pub const fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.status
    }

    /// Returns how many attempts have failed so far.
    #[must_use]
    pub const fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    /// Returns whether another attempt is allowed after `attempts_made`
    /// failures.
    #[must_use]
    pub const fn has_attempts_left(&self) -> bool {
        self.attempts_made < self.options.attempts
    }

    /// Returns the handler result of a completed job.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Returns the last failure message.
    #[must_use]
    pub fn failed_reason(&self) -> Option<&str> {
        self.failed_reason.as_deref()
    }

    /// Returns when the job was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the latest attempt started.
    #[must_use]
    pub const fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    /// Returns when the job reached a terminal status.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Marks the job leased by a worker.
    pub const fn start(&mut self, at: DateTime<Utc>) {
        self.status = JobStatus::Active;
        self.processed_at = Some(at);
    }

    /// Marks the job completed with `result`.
    pub fn complete(&mut self, result: Value, at: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.finished_at = Some(at);
    }

    /// Records a failed attempt.
    ///
    /// With `retry` set the job goes back to `Waiting` (or `Delayed` when
    /// `delayed` is true); otherwise it fails terminally.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        retry: bool,
        delayed: bool,
        at: DateTime<Utc>,
    ) {
        self.attempts_made = self.attempts_made.saturating_add(1);
        self.failed_reason = Some(error.into());
        self.status = match (retry, delayed) {
            (false, _) => {
                self.finished_at = Some(at);
                JobStatus::Failed
            }
            (true, true) => JobStatus::Delayed,
            (true, false) => JobStatus::Waiting,
        };
    }

    /// Moves a delayed job to `Waiting` once its delay elapsed.
    pub fn promote(&mut self) {
        if self.status == JobStatus::Delayed {
            self.status = JobStatus::Waiting;
        }
    }
}

/// Job counts of one queue by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    /// Jobs ready to run.
    pub waiting: usize,
    /// Jobs leased by a worker.
    pub active: usize,
    /// Completed jobs still retained.
    pub completed: usize,
    /// Failed jobs still retained.
    pub failed: usize,
    /// Jobs waiting for a delay or backoff.
    pub delayed: usize,
    /// Ready jobs held back because the queue is paused.
    pub paused: usize,
}

impl JobCounts {
    /// Adds one job in `status` to the counts.
    pub const fn record(&mut self, status: JobStatus) {
        let slot = match status {
            JobStatus::Waiting => &mut self.waiting,
            JobStatus::Active => &mut self.active,
            JobStatus::Completed => &mut self.completed,
            JobStatus::Failed => &mut self.failed,
            JobStatus::Delayed => &mut self.delayed,
        };
        *slot = slot.saturating_add(1);
    }

    /// Reports waiting jobs as paused.
    #[must_use]
    pub const fn as_paused(mut self) -> Self {
        self.paused = self.paused.saturating_add(self.waiting);
        self.waiting = 0;
        self
    }

    /// Returns jobs not yet terminal.
    #[must_use]
    pub const fn backlog(&self) -> usize {
        self.waiting
            .saturating_add(self.active)
            .saturating_add(self.delayed)
            .saturating_add(self.paused)
    }
}
