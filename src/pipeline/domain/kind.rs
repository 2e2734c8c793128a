//! Job kinds, one per logical queue.

use super::ParseJobKindError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The logical queue a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Plans an evaluation and seeds its first agent jobs.
    EvaluationRequest,
    /// Runs one agent for one evaluation.
    AgentTask,
    /// Aggregates agent results once every agent finished.
    ResultProcessing,
}

impl JobKind {
    /// Every job kind, in pipeline order.
    pub const ALL: [Self; 3] = [
        Self::EvaluationRequest,
        Self::AgentTask,
        Self::ResultProcessing,
    ];

    /// Returns the canonical queue name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EvaluationRequest => "evaluation-request",
            Self::AgentTask => "agent-task",
            Self::ResultProcessing => "result-processing",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for JobKind {
    type Error = ParseJobKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ParseJobKindError(value.to_owned()))
    }
}
