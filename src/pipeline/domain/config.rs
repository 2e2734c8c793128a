//! Queue configuration.

use super::{BackoffPolicy, JobKind, JobOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings of one logical queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Maximum jobs executing at once.
    pub concurrency: usize,
    /// Options applied when `add` receives none.
    pub default_options: JobOptions,
    /// Lease granted to a worker per dequeue and per heartbeat.
    pub lease_ms: u64,
    /// How often a running job renews its lease.
    pub heartbeat_ms: u64,
    /// How often expired leases are reclaimed.
    pub stall_check_interval_ms: u64,
    /// Idle wait between dequeue attempts on an empty queue.
    pub poll_interval_ms: u64,
    /// How long finished jobs stay inspectable before the sweep reclaims
    /// them.
    pub retention_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            default_options: JobOptions::default(),
            lease_ms: 30_000,
            heartbeat_ms: 10_000,
            stall_check_interval_ms: 15_000,
            poll_interval_ms: 250,
            retention_ms: 3_600_000,
        }
    }
}

impl QueueSettings {
    /// Sets the concurrency limit; at least one job can always run.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets the default job options.
    #[must_use]
    pub const fn with_default_options(mut self, options: JobOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Returns the lease length.
    #[must_use]
    pub const fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    /// Returns the heartbeat period.
    #[must_use]
    pub const fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    /// Returns the stall check period.
    #[must_use]
    pub const fn stall_check_interval(&self) -> Duration {
        Duration::from_millis(self.stall_check_interval_ms)
    }

    /// Returns the idle poll period.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns how long finished jobs are retained.
    #[must_use]
    pub const fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }
}

/// Settings of the three pipeline queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Evaluation-request queue.
    pub evaluation: QueueSettings,
    /// Agent-task queue.
    pub agent: QueueSettings,
    /// Result-processing queue.
    pub results: QueueSettings,
    /// Capacity of the queue event broadcast channel.
    pub event_capacity: usize,
    /// How often finished jobs past their retention are reclaimed.
    pub clean_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let base = QueueSettings::default();
        Self {
            evaluation: base,
            agent: base.with_concurrency(10).with_default_options(
                JobOptions::default().with_backoff(BackoffPolicy::exponential(Duration::from_secs(5))),
            ),
            results: base.with_default_options(
                JobOptions::default()
                    .with_attempts(5)
                    .with_backoff(BackoffPolicy::fixed(Duration::from_secs(1))),
            ),
            event_capacity: 1024,
            clean_interval_ms: 60_000,
        }
    }
}

impl PipelineConfig {
    /// Returns the retention sweep period.
    #[must_use]
    pub const fn clean_interval(&self) -> Duration {
        Duration::from_millis(self.clean_interval_ms)
    }

    /// Returns the settings of `kind`'s queue.
    #[must_use]
    pub const fn settings(&self, kind: JobKind) -> &QueueSettings {
        match kind {
            JobKind::EvaluationRequest => &self.evaluation,
            JobKind::AgentTask => &self.agent,
            JobKind::ResultProcessing => &self.results,
        }
    }

    /// Returns mutable settings of `kind`'s queue.
    pub const fn settings_mut(&mut self, kind: JobKind) -> &mut QueueSettings {
        match kind {
            JobKind::EvaluationRequest => &mut self.evaluation,
            JobKind::AgentTask => &mut self.agent,
            JobKind::ResultProcessing => &mut self.results,
        }
    }
}
