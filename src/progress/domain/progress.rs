//! Evaluation progress snapshot.

use super::{AgentRunStatus, EvaluationState, ProgressError, ProgressResult};
use crate::ids::EvaluationId;
use crate::scheduler::domain::AgentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Progress of one agent within an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProgress {
    status: AgentRunStatus,
    percentage: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    updated_at: DateTime<Utc>,
}

impl AgentProgress {
    const fn pending(at: DateTime<Utc>) -> Self {
        Self {
            status: AgentRunStatus::Pending,
            percentage: 0,
            error: None,
            updated_at: at,
        }
    }

    /// Returns the agent's run status.
    #[must_use]
    pub const fn status(&self) -> AgentRunStatus {
        self.status
    }

    /// Returns completion in percent.
    #[must_use]
    pub const fn percentage(&self) -> u8 {
        self.percentage
    }

    /// Returns the latest error reported by the agent.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns when the entry last changed.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Clamps a reported percentage into `0..=100`.
fn clamp_percentage(percentage: i64) -> u8 {
    u8::try_from(percentage.clamp(0, 100)).unwrap_or(100)
}

/// Point-in-time summary of an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationProgress {
    evaluation_id: EvaluationId,
    state: EvaluationState,
    overall_progress: u8,
    agents: BTreeMap<AgentType, AgentProgress>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl EvaluationProgress {
    /// Seeds a snapshot with every agent pending at 0%.
    #[must_use]
    pub fn new(
        evaluation_id: EvaluationId,
        agent_types: impl IntoIterator<Item = AgentType>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            evaluation_id,
            state: EvaluationState::Pending,
            overall_progress: 0,
            agents: agent_types
                .into_iter()
                .map(|agent_type| (agent_type, AgentProgress::pending(at)))
                .collect(),
            started_at: at,
            updated_at: at,
            finished_at: None,
            error: None,
        }
    }

    /// Returns the evaluation identifier.
    #[must_use]
    pub const fn evaluation_id(&self) -> EvaluationId {
        self.evaluation_id
    }

    /// Returns the evaluation state.
    #[must_use]
    pub const fn state(&self) -> EvaluationState {
        self.state
    }

    /// Returns the mean agent percentage, rounded to the nearest integer.
    #[must_use]
    pub const fn overall_progress(&self) -> u8 {
        self.overall_progress
    }

    /// Returns the entry for `agent_type`.
    #[must_use]
    pub fn agent(&self, agent_type: &AgentType) -> Option<&AgentProgress> {
        self.agents.get(agent_type)
    }

    /// Returns every tracked agent.
    #[must_use]
    pub const fn agents(&self) -> &BTreeMap<AgentType, AgentProgress> {
        &self.agents
    }

    /// Returns agents currently running.
    #[must_use]
    pub fn active_agents(&self) -> Vec<AgentType> {
        self.agents_with(AgentRunStatus::Running)
    }

    /// Returns agents that completed.
    #[must_use]
    pub fn completed_agents(&self) -> Vec<AgentType> {
        self.agents_with(AgentRunStatus::Completed)
    }

    /// Returns agents that failed terminally.
    #[must_use]
    pub fn failed_agents(&self) -> Vec<AgentType> {
        self.agents_with(AgentRunStatus::Failed)
    }

    /// Returns whether every agent reached a terminal status.
    #[must_use]
    pub fn all_agents_finished(&self) -> bool {
        self.agents.values().all(|entry| entry.status.is_terminal())
    }

    /// Returns when tracking began.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the snapshot last changed.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns when the evaluation reached a terminal state.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Returns the evaluation-level error, if it failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Applies an agent update.
    ///
    /// The percentage is clamped to `0..=100`; `Completed` forces 100.
    /// Terminal agent entries ignore later non-terminal updates so a
    /// redelivered progress message cannot resurrect a finished agent.
    /// Returns whether the snapshot changed.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::UnknownAgent`] when `agent_type` was not
    /// seeded.
    pub fn apply_agent_update(
        &mut self,
        agent_type: &AgentType,
        status: AgentRunStatus,
        percentage: i64,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> ProgressResult<bool> {
        let evaluation_id = self.evaluation_id;
        let entry = self
            .agents
            .get_mut(agent_type)
            .ok_or_else(|| ProgressError::UnknownAgent {
                evaluation_id,
                agent_type: agent_type.clone(),
            })?;

        if entry.status.is_terminal() && !status.is_terminal() {
            return Ok(false);
        }

        entry.status = status;
        entry.percentage = if status == AgentRunStatus::Completed {
            100
        } else {
            clamp_percentage(percentage)
        };
        if error.is_some() {
            entry.error = error;
        }
        entry.updated_at = at;

        if self.state == EvaluationState::Pending && status != AgentRunStatus::Pending {
            self.state = EvaluationState::Running;
        }
        self.recompute_overall();
        self.updated_at = at;
        Ok(true)
    }

    /// Marks the evaluation completed.
    pub fn complete(&mut self, at: DateTime<Utc>) {
        self.finish(EvaluationState::Completed, None, at);
    }

    /// Marks the evaluation failed.
    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.finish(EvaluationState::Failed, Some(error.into()), at);
    }

    fn finish(&mut self, state: EvaluationState, error: Option<String>, at: DateTime<Utc>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = state;
        self.error = error;
        self.finished_at = Some(at);
        self.updated_at = at;
    }

    fn agents_with(&self, status: AgentRunStatus) -> Vec<AgentType> {
        self.agents
            .iter()
            .filter(|(_, entry)| entry.status == status)
            .map(|(agent_type, _)| agent_type.clone())
            .collect()
    }

    fn recompute_overall(&mut self) {
        let count = u64::try_from(self.agents.len()).unwrap_or(u64::MAX);
        let total: u64 = self
            .agents
            .values()
            .map(|entry| u64::from(entry.percentage))
            .sum();
        let rounded = total
            .saturating_mul(2)
            .saturating_add(count)
            .checked_div(count.saturating_mul(2))
            .unwrap_or(0);
        self.overall_progress = u8::try_from(rounded.min(100)).unwrap_or(100);
    }
}
