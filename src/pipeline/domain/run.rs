//! Dependency bookkeeping for one evaluation in flight.

use super::JobId;
use crate::ids::EvaluationId;
use crate::scheduler::domain::AgentType;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Where one agent of an evaluation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    /// Waiting for dependencies.
    Waiting,
    /// Handed to the agent queue; the job id is known once enqueued.
    Dispatched(Option<JobId>),
    /// Finished with a result.
    Completed,
    /// Failed with no attempts left.
    Failed,
    /// Never run because a dependency failed.
    Skipped,
}

impl AgentPhase {
    /// Returns whether the agent will not run again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// Tracks which agents of an evaluation may run next.
///
/// An agent is released only once every dependency inside the run has
/// completed. A terminal failure skips every transitive dependent.
#[derive(Debug, Clone)]
pub struct EvaluationRun {
    evaluation_id: EvaluationId,
    idea: String,
    parameters: Value,
    dependencies: BTreeMap<AgentType, BTreeSet<AgentType>>,
    phases: BTreeMap<AgentType, AgentPhase>,
    results: BTreeMap<AgentType, Value>,
    errors: BTreeMap<AgentType, String>,
    finalizing: bool,
}

impl EvaluationRun {
    /// Creates a run over the agents keyed in `dependencies`.
    ///
    /// Dependencies naming agents outside the run are ignored.
    #[must_use]
    pub fn new(
        evaluation_id: EvaluationId,
        idea: impl Into<String>,
        parameters: Value,
        dependencies: BTreeMap<AgentType, BTreeSet<AgentType>>,
    ) -> Self {
        let members: BTreeSet<AgentType> = dependencies.keys().cloned().collect();
        let restricted: BTreeMap<AgentType, BTreeSet<AgentType>> = dependencies
            .into_iter()
            .map(|(agent, deps)| {
                let inside = deps.intersection(&members).cloned().collect();
                (agent, inside)
            })
            .collect();
        let phases = members
            .into_iter()
            .map(|agent| (agent, AgentPhase::Waiting))
            .collect();
        Self {
            evaluation_id,
            idea: idea.into(),
            parameters,
            dependencies: restricted,
            phases,
            results: BTreeMap::new(),
            errors: BTreeMap::new(),
            finalizing: false,
        }
    }

    /// Returns the evaluation identifier.
    #[must_use]
    pub const fn evaluation_id(&self) -> EvaluationId {
        self.evaluation_id
    }

    /// Returns the idea under evaluation.
    #[must_use]
    pub fn idea(&self) -> &str {
        &self.idea
    }

    /// Returns the caller-supplied parameters.
    #[must_use]
    pub const fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Returns the agents of the run.
    pub fn agents(&self) -> impl Iterator<Item = &AgentType> {
        self.phases.keys()
    }

    /// Returns the phase of `agent`.
    #[must_use]
    pub fn phase(&self, agent: &AgentType) -> Option<AgentPhase> {
        self.phases.get(agent).copied()
    }

    /// Marks every waiting agent whose dependencies completed as
    /// dispatched and returns them.
    pub fn take_ready(&mut self) -> Vec<AgentType> {
        let ready: Vec<AgentType> = self
            .phases
            .iter()
            .filter(|(_, phase)| **phase == AgentPhase::Waiting)
            .filter(|(agent, _)| {
                self.dependencies.get(*agent).is_none_or(|deps| {
                    deps.iter()
                        .all(|dep| self.phases.get(dep) == Some(&AgentPhase::Completed))
                })
            })
            .map(|(agent, _)| agent.clone())
            .collect();
        for agent in &ready {
            self.phases.insert(agent.clone(), AgentPhase::Dispatched(None));
        }
        ready
    }

    /// Records the job carrying a dispatched agent.
    pub fn assign_job(&mut self, agent: &AgentType, job_id: JobId) {
        if let Some(phase) = self.phases.get_mut(agent)
            && matches!(phase, AgentPhase::Dispatched(_))
        {
            *phase = AgentPhase::Dispatched(Some(job_id));
        }
    }

    /// Records a completed agent. Returns false for unknown or already
    /// terminal agents.
    pub fn record_completion(&mut self, agent: &AgentType, result: Value) -> bool {
        match self.phases.get_mut(agent) {
            Some(phase) if !phase.is_terminal() => {
                *phase = AgentPhase::Completed;
                self.results.insert(agent.clone(), result);
                true
            }
            _ => false,
        }
    }

    /// Records a terminal agent failure and skips its transitive
    /// dependents, returning the skipped agents.
    pub fn record_failure(&mut self, agent: &AgentType, error: impl Into<String>) -> Vec<AgentType> {
        match self.phases.get_mut(agent) {
            Some(phase) if !phase.is_terminal() => *phase = AgentPhase::Failed,
            _ => return Vec::new(),
        }
        self.errors.insert(agent.clone(), error.into());

        let mut skipped = Vec::new();
        loop {
            let blocked: Vec<AgentType> = self
                .phases
                .iter()
                .filter(|(_, phase)| **phase == AgentPhase::Waiting)
                .filter(|(candidate, _)| {
                    self.dependencies.get(*candidate).is_some_and(|deps| {
                        deps.iter().any(|dep| {
                            matches!(
                                self.phases.get(dep),
                                Some(AgentPhase::Failed | AgentPhase::Skipped)
                            )
                        })
                    })
                })
                .map(|(candidate, _)| candidate.clone())
                .collect();
            if blocked.is_empty() {
                break;
            }
            for candidate in blocked {
                self.errors.insert(
                    candidate.clone(),
                    format!("skipped: dependency {agent} failed"),
                );
                self.phases.insert(candidate.clone(), AgentPhase::Skipped);
                skipped.push(candidate);
            }
        }
        skipped
    }

    /// Returns whether every agent is terminal.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.phases.values().all(|phase| phase.is_terminal())
    }

    /// Returns true exactly once, the first time it is called on a
    /// finished run.
    pub fn begin_finalizing(&mut self) -> bool {
        if self.finalizing || !self.is_finished() {
            return false;
        }
        self.finalizing = true;
        true
    }

    /// Returns results of `agent`'s completed dependencies.
    #[must_use]
    pub fn dependency_results(&self, agent: &AgentType) -> BTreeMap<AgentType, Value> {
        self.dependencies
            .get(agent)
            .map(|deps| {
                deps.iter()
                    .filter_map(|dep| self.results.get(dep).map(|value| (dep.clone(), value.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns results of every completed agent.
    #[must_use]
    pub const fn results(&self) -> &BTreeMap<AgentType, Value> {
        &self.results
    }

    /// Returns the error recorded for a failed or skipped agent.
    #[must_use]
    pub fn error(&self, agent: &AgentType) -> Option<&str> {
        self.errors.get(agent).map(String::as_str)
    }

    /// Returns agents that failed or were skipped.
    #[must_use]
    pub fn failed_agents(&self) -> Vec<AgentType> {
        self.phases
            .iter()
            .filter(|(_, phase)| matches!(phase, AgentPhase::Failed | AgentPhase::Skipped))
            .map(|(agent, _)| agent.clone())
            .collect()
    }

    /// Returns dispatched agents with their job ids.
    #[must_use]
    pub fn in_flight(&self) -> Vec<(AgentType, Option<JobId>)> {
        self.phases
            .iter()
            .filter_map(|(agent, phase)| match phase {
                AgentPhase::Dispatched(job_id) => Some((agent.clone(), *job_id)),
                AgentPhase::Waiting
                | AgentPhase::Completed
                | AgentPhase::Failed
                | AgentPhase::Skipped => None,
            })
            .collect()
    }
}
