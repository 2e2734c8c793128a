//! Typed payloads of the message catalogue.

use super::{MessageId, MessageType};
use crate::ids::EvaluationId;
use crate::progress::domain::EvaluationState;
use crate::scheduler::domain::{AgentHealthStatus, AgentType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Payload of a bus message, keyed by evaluation id and agent type where
/// applicable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePayload {
    /// An agent started working.
    AgentStart {
        /// Evaluation the agent works on.
        evaluation_id: EvaluationId,
        /// Agent that started.
        agent_type: AgentType,
    },
    /// An agent reported progress.
    AgentProgress {
        /// Evaluation the agent works on.
        evaluation_id: EvaluationId,
        /// Reporting agent.
        agent_type: AgentType,
        /// Reported percentage; receivers clamp it to `0..=100`.
        percentage: i64,
        /// Optional human-readable status line.
        note: Option<String>,
    },
    /// An agent finished successfully.
    AgentComplete {
        /// Evaluation the agent worked on.
        evaluation_id: EvaluationId,
        /// Agent that finished.
        agent_type: AgentType,
        /// Result produced by the agent.
        result: Value,
    },
    /// An agent attempt failed.
    AgentError {
        /// Evaluation the agent worked on.
        evaluation_id: EvaluationId,
        /// Agent that failed.
        agent_type: AgentType,
        /// Failure description.
        error: String,
        /// Whether no further attempts will be made.
        terminal: bool,
    },
    /// Evaluation-level status change.
    EvaluationStatus {
        /// Evaluation whose status changed.
        evaluation_id: EvaluationId,
        /// New state.
        state: EvaluationState,
        /// Overall progress in percent.
        overall_progress: u8,
    },
    /// The evaluation failed.
    EvaluationError {
        /// Failed evaluation.
        evaluation_id: EvaluationId,
        /// Failure description.
        error: String,
    },
    /// The evaluation finished.
    EvaluationComplete {
        /// Finished evaluation.
        evaluation_id: EvaluationId,
        /// Results of every agent that succeeded.
        results: BTreeMap<AgentType, Value>,
        /// Agents that failed or were skipped.
        failed_agents: Vec<AgentType>,
    },
    /// Result of an agent health probe.
    AgentHealth {
        /// Probed agent.
        agent_type: AgentType,
        /// Observed status.
        status: AgentHealthStatus,
        /// Optional diagnostic detail.
        detail: Option<String>,
    },
    /// A handler failed while processing another message.
    HandlerError {
        /// Message whose handling failed.
        message_id: MessageId,
        /// Type of the message whose handling failed.
        message_type: MessageType,
        /// Name of the failing handler.
        handler: String,
        /// Failure description.
        error: String,
    },
    /// Generic request.
    Request {
        /// Topic understood by responders.
        topic: String,
        /// Request body.
        body: Value,
    },
    /// Reply to a request.
    Reply {
        /// Reply body.
        body: Value,
    },
}

impl MessagePayload {
    /// Returns the message type this payload belongs to.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::AgentStart { .. } => MessageType::AgentStart,
            Self::AgentProgress { .. } => MessageType::AgentProgress,
            Self::AgentComplete { .. } => MessageType::AgentComplete,
            Self::AgentError { .. } => MessageType::AgentError,
            Self::EvaluationStatus { .. } => MessageType::EvaluationStatus,
            Self::EvaluationError { .. } => MessageType::EvaluationError,
            Self::EvaluationComplete { .. } => MessageType::EvaluationComplete,
            Self::AgentHealth { .. } => MessageType::AgentHealth,
            Self::HandlerError { .. } => MessageType::HandlerError,
            Self::Request { .. } => MessageType::Request,
            Self::Reply { .. } => MessageType::Reply,
        }
    }

    /// Returns the evaluation this payload refers to, if any.
    #[must_use]
    pub const fn evaluation_id(&self) -> Option<EvaluationId> {
        match self {
            Self::AgentStart { evaluation_id, .. }
            | Self::AgentProgress { evaluation_id, .. }
            | Self::AgentComplete { evaluation_id, .. }
            | Self::AgentError { evaluation_id, .. }
            | Self::EvaluationStatus { evaluation_id, .. }
            | Self::EvaluationError { evaluation_id, .. }
            | Self::EvaluationComplete { evaluation_id, .. } => Some(*evaluation_id),
            Self::AgentHealth { .. }
            | Self::HandlerError { .. }
            | Self::Request { .. }
            | Self::Reply { .. } => None,
        }
    }

    /// Returns the agent this payload refers to, if any.
    #[must_use]
    pub const fn agent_type(&self) -> Option<&AgentType> {
        match self {
            Self::AgentStart { agent_type, .. }
            | Self::AgentProgress { agent_type, .. }
            | Self::AgentComplete { agent_type, .. }
            | Self::AgentError { agent_type, .. }
            | Self::AgentHealth { agent_type, .. } => Some(agent_type),
            Self::EvaluationStatus { .. }
            | Self::EvaluationError { .. }
            | Self::EvaluationComplete { .. }
            | Self::HandlerError { .. }
            | Self::Request { .. }
            | Self::Reply { .. } => None,
        }
    }
}
