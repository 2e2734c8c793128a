//! Typed job payloads.

use super::JobKind;
use crate::ids::EvaluationId;
use crate::scheduler::domain::AgentType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Work carried by a job; the variant decides the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum JobPayload {
    /// Evaluate an idea with the given agents.
    EvaluationRequest {
        /// Evaluation being started.
        evaluation_id: EvaluationId,
        /// Idea under evaluation.
        idea: String,
        /// Agents to run; empty means every registered agent.
        #[serde(default)]
        agents: Vec<AgentType>,
        /// Caller-supplied parameters forwarded to agents.
        #[serde(default)]
        parameters: Value,
    },
    /// Run one agent.
    AgentTask {
        /// Owning evaluation.
        evaluation_id: EvaluationId,
        /// Agent to run.
        agent_type: AgentType,
        /// Idea under evaluation.
        idea: String,
        /// Caller-supplied parameters.
        #[serde(default)]
        parameters: Value,
    },
    /// Aggregate results of a finished evaluation.
    ResultProcessing {
        /// Evaluation to aggregate.
        evaluation_id: EvaluationId,
    },
}

impl JobPayload {
    /// Returns the queue this payload belongs to.
    #[must_use]
    pub const fn kind(&self) -> JobKind {
        match self {
            Self::EvaluationRequest { .. } => JobKind::EvaluationRequest,
            Self::AgentTask { .. } => JobKind::AgentTask,
            Self::ResultProcessing { .. } => JobKind::ResultProcessing,
        }
    }

    /// Returns the owning evaluation.
    #[must_use]
    pub const fn evaluation_id(&self) -> EvaluationId {
        match self {
            Self::EvaluationRequest { evaluation_id, .. }
            | Self::AgentTask { evaluation_id, .. }
            | Self::ResultProcessing { evaluation_id } => *evaluation_id,
        }
    }

    /// Returns the agent for agent tasks.
    #[must_use]
    pub const fn agent_type(&self) -> Option<&AgentType> {
        match self {
            Self::AgentTask { agent_type, .. } => Some(agent_type),
            Self::EvaluationRequest { .. } | Self::ResultProcessing { .. } => None,
        }
    }
}
