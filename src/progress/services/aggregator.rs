//! Progress aggregator service.

use crate::background::BackgroundTask;
use crate::clock::elapsed_between;
use crate::ids::EvaluationId;
use crate::progress::domain::{
    AgentRunStatus, EvaluationProgress, ProgressConfig, ProgressError, ProgressResult,
};
use crate::scheduler::domain::AgentType;
use mockable::Clock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;

struct Tracked {
    progress: EvaluationProgress,
    sender: watch::Sender<EvaluationProgress>,
}

impl Tracked {
    fn publish(&self) {
        self.sender.send_replace(self.progress.clone());
    }
}

struct AggregatorInner<C> {
    config: ProgressConfig,
    clock: Arc<C>,
    evaluations: RwLock<HashMap<EvaluationId, Tracked>>,
}

/// Owner of every live evaluation snapshot.
///
/// Readers always receive copies; the aggregator's own state is only
/// mutated through its methods.
pub struct ProgressAggregator<C: Clock + Send + Sync + 'static> {
    inner: Arc<AggregatorInner<C>>,
}

impl<C: Clock + Send + Sync + 'static> Clone for ProgressAggregator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock + Send + Sync + 'static> ProgressAggregator<C> {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new(config: ProgressConfig, clock: Arc<C>) -> Self {
        Self {
            inner: Arc::new(AggregatorInner {
                config,
                clock,
                evaluations: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Returns the aggregator configuration.
    #[must_use]
    pub fn config(&self) -> &ProgressConfig {
        &self.inner.config
    }

    /// Seeds a snapshot with `agent_types` pending at 0%.
    ///
    /// Initializing an evaluation that is already tracked leaves the
    /// existing snapshot untouched and returns it, so a redelivered
    /// evaluation request does not reset progress.
    pub fn initialize_evaluation(
        &self,
        evaluation_id: EvaluationId,
        agent_types: impl IntoIterator<Item = AgentType>,
    ) -> EvaluationProgress {
        let mut evaluations = self.write();
        if let Some(existing) = evaluations.get(&evaluation_id) {
            tracing::debug!(%evaluation_id, "evaluation already tracked");
            return existing.progress.clone();
        }

        let progress = EvaluationProgress::new(evaluation_id, agent_types, self.inner.clock.utc());
        let (sender, _) = watch::channel(progress.clone());
        evaluations.insert(
            evaluation_id,
            Tracked {
                progress: progress.clone(),
                sender,
            },
        );
        tracing::debug!(
            %evaluation_id,
            agents = progress.agents().len(),
            "evaluation progress initialized"
        );
        progress
    }

    /// Records an agent's status and percentage.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::UnknownEvaluation`] for an unseeded id or
    /// [`ProgressError::UnknownAgent`] for an agent outside the seeded set.
    pub fn update_agent_progress(
        &self,
        evaluation_id: EvaluationId,
        agent_type: &AgentType,
        status: AgentRunStatus,
        percentage: i64,
    ) -> ProgressResult<EvaluationProgress> {
        self.apply(evaluation_id, agent_type, status, percentage, None)
    }

    /// Records an agent failure with its error message.
    ///
    /// A non-terminal failure keeps the agent running (it is being
    /// retried); a terminal one marks it failed.
    ///
    /// # Errors
    ///
    /// Returns the same errors as
    /// [`ProgressAggregator::update_agent_progress`].
    pub fn record_agent_error(
        &self,
        evaluation_id: EvaluationId,
        agent_type: &AgentType,
        error: impl Into<String>,
        terminal: bool,
    ) -> ProgressResult<EvaluationProgress> {
        let current = self
            .get_evaluation_progress(evaluation_id)
            .ok_or(ProgressError::UnknownEvaluation(evaluation_id))?
            .agent(agent_type)
            .map_or(0, |entry| i64::from(entry.percentage()));
        let status = if terminal {
            AgentRunStatus::Failed
        } else {
            AgentRunStatus::Running
        };
        self.apply(
            evaluation_id,
            agent_type,
            status,
            current,
            Some(error.into()),
        )
    }

    /// Marks the evaluation completed.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::UnknownEvaluation`] for an unseeded id.
    pub fn complete_evaluation(
        &self,
        evaluation_id: EvaluationId,
    ) -> ProgressResult<EvaluationProgress> {
        let now = self.inner.clock.utc();
        self.mutate(evaluation_id, |progress| {
            progress.complete(now);
            Ok(true)
        })
    }

    /// Marks the evaluation failed.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::UnknownEvaluation`] for an unseeded id.
    pub fn fail_evaluation(
        &self,
        evaluation_id: EvaluationId,
        error: impl Into<String>,
    ) -> ProgressResult<EvaluationProgress> {
        let now = self.inner.clock.utc();
        let message = error.into();
        self.mutate(evaluation_id, |progress| {
            progress.fail(message, now);
            Ok(true)
        })
    }

    /// Returns a copy of the snapshot, or `None` for unknown ids.
    #[must_use]
    pub fn get_evaluation_progress(&self, evaluation_id: EvaluationId) -> Option<EvaluationProgress> {
        self.read()
            .get(&evaluation_id)
            .map(|tracked| tracked.progress.clone())
    }

    /// Returns a receiver that observes every change to the snapshot.
    #[must_use]
    pub fn watch(&self, evaluation_id: EvaluationId) -> Option<watch::Receiver<EvaluationProgress>> {
        self.read()
            .get(&evaluation_id)
            .map(|tracked| tracked.sender.subscribe())
    }

    /// Returns whether the evaluation is tracked.
    #[must_use]
    pub fn contains(&self, evaluation_id: EvaluationId) -> bool {
        self.read().contains_key(&evaluation_id)
    }

    /// Returns copies of every tracked snapshot, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<EvaluationProgress> {
        let mut snapshots: Vec<EvaluationProgress> = self
            .read()
            .values()
            .map(|tracked| tracked.progress.clone())
            .collect();
        snapshots.sort_by_key(EvaluationProgress::started_at);
        snapshots
    }

    /// Returns the number of tracked evaluations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Stops tracking an evaluation, returning its final snapshot.
    pub fn remove(&self, evaluation_id: EvaluationId) -> Option<EvaluationProgress> {
        self.write()
            .remove(&evaluation_id)
            .map(|tracked| tracked.progress)
    }

    /// Drops terminal evaluations older than the retention window.
    ///
    /// Returns the number of snapshots removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.inner.clock.utc();
        let retention = self.inner.config.retention();
        let mut evaluations = self.write();
        let before = evaluations.len();
        evaluations.retain(|_, tracked| {
            tracked
                .progress
                .finished_at()
                .is_none_or(|finished| elapsed_between(finished, now) < retention)
        });
        let removed = before.saturating_sub(evaluations.len());
        if removed > 0 {
            tracing::debug!(removed, "expired evaluation snapshots reclaimed");
        }
        removed
    }

    /// Starts the periodic retention sweep.
    #[must_use]
    pub fn start_cleanup(&self) -> BackgroundTask {
        let aggregator = self.clone();
        BackgroundTask::every(
            "progress-retention",
            self.inner.config.cleanup_interval(),
            move || {
                aggregator.cleanup_expired();
                std::future::ready(())
            },
        )
    }

    fn apply(
        &self,
        evaluation_id: EvaluationId,
        agent_type: &AgentType,
        status: AgentRunStatus,
        percentage: i64,
        error: Option<String>,
    ) -> ProgressResult<EvaluationProgress> {
        let now = self.inner.clock.utc();
        self.mutate(evaluation_id, |progress| {
            progress.apply_agent_update(agent_type, status, percentage, error, now)
        })
    }

    fn mutate<F>(&self, evaluation_id: EvaluationId, change: F) -> ProgressResult<EvaluationProgress>
    where
        F: FnOnce(&mut EvaluationProgress) -> ProgressResult<bool>,
    {
        let mut evaluations = self.write();
        let tracked = evaluations
            .get_mut(&evaluation_id)
            .ok_or(ProgressError::UnknownEvaluation(evaluation_id))?;
        if change(&mut tracked.progress)? {
            tracked.publish();
        }
        Ok(tracked.progress.clone())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<EvaluationId, Tracked>> {
        self.inner
            .evaluations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<EvaluationId, Tracked>> {
        self.inner
            .evaluations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Clock + Send + Sync + 'static> fmt::Debug for ProgressAggregator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("config", &self.inner.config)
            .field("evaluations", &self.len())
            .finish_non_exhaustive()
    }
}
