//! Per-job enqueue options.

use super::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options applied to a job when it is enqueued.
///
/// Lower `priority` values are dequeued first; jobs of equal priority
/// leave the queue in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Dequeue priority; lower runs first.
    pub priority: u32,
    /// Delay before the job first becomes ready.
    pub delay_ms: u64,
    /// Total attempts allowed, including the first.
    pub attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: BackoffPolicy,
    /// Drop the job from the backend once it completes.
    pub remove_on_complete: bool,
    /// Drop the job from the backend once it fails terminally.
    pub remove_on_fail: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            delay_ms: 0,
            attempts: 3,
            backoff: BackoffPolicy::default(),
            remove_on_complete: false,
            remove_on_fail: false,
        }
    }
}

impl JobOptions {
    /// Sets the dequeue priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Delays the first attempt.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the total number of attempts; at least one is always made.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Sets the retry backoff.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Removes the job once it completes.
    #[must_use]
    pub const fn removing_on_complete(mut self) -> Self {
        self.remove_on_complete = true;
        self
    }

    /// Removes the job once it fails terminally.
    #[must_use]
    pub const fn removing_on_fail(mut self) -> Self {
        self.remove_on_fail = true;
        self
    }

    /// Returns the initial delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
