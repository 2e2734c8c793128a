//! Progress aggregator errors.

use crate::ids::EvaluationId;
use crate::scheduler::domain::AgentType;
use thiserror::Error;

/// Errors returned by the progress aggregator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProgressError {
    /// The evaluation was never initialized or has been reclaimed.
    #[error("unknown evaluation: {0}")]
    UnknownEvaluation(EvaluationId),

    /// The agent was not part of the evaluation's seeded agent set.
    #[error("agent {agent_type} is not tracked for evaluation {evaluation_id}")]
    UnknownAgent {
        /// Evaluation being updated.
        evaluation_id: EvaluationId,
        /// Agent that is not tracked.
        agent_type: AgentType,
    },
}

/// Result type for aggregator operations.
pub type ProgressResult<T> = Result<T, ProgressError>;

/// Error returned while parsing an evaluation or agent run state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown progress state: {0}")]
pub struct ParseEvaluationStateError(pub String);
