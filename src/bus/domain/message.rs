//! Bus message envelope and the closed set of message types.

use super::{CorrelationId, MessageId, MessagePayload, ParseMessageTypeError};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed catalogue of message types carried by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    /// An agent started working on an evaluation.
    AgentStart,
    /// An agent reported intermediate progress.
    AgentProgress,
    /// An agent finished successfully.
    AgentComplete,
    /// An agent attempt failed.
    AgentError,
    /// Evaluation-level status change.
    EvaluationStatus,
    /// The evaluation failed.
    EvaluationError,
    /// The evaluation finished and results were processed.
    EvaluationComplete,
    /// An agent health probe changed or failed.
    AgentHealth,
    /// A handler failed while processing another message.
    HandlerError,
    /// Generic request expecting a reply.
    Request,
    /// Reply to a request.
    Reply,
}

impl MessageType {
    /// Every message type, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::AgentStart,
        Self::AgentProgress,
        Self::AgentComplete,
        Self::AgentError,
        Self::EvaluationStatus,
        Self::EvaluationError,
        Self::EvaluationComplete,
        Self::AgentHealth,
        Self::HandlerError,
        Self::Request,
        Self::Reply,
    ];

    /// Returns the canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AgentStart => "agent-start",
            Self::AgentProgress => "agent-progress",
            Self::AgentComplete => "agent-complete",
            Self::AgentError => "agent-error",
            Self::EvaluationStatus => "evaluation-status",
            Self::EvaluationError => "evaluation-error",
            Self::EvaluationComplete => "evaluation-complete",
            Self::AgentHealth => "agent-health",
            Self::HandlerError => "handler-error",
            Self::Request => "request",
            Self::Reply => "reply",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for MessageType {
    type Error = ParseMessageTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ParseMessageTypeError(value.to_owned()))
    }
}

/// Immutable bus message.
///
/// The correlation and reply identifiers are set while building the message;
/// once handed to the bus it is never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    payload: MessagePayload,
    timestamp: DateTime<Utc>,
    correlation_id: Option<CorrelationId>,
    reply_to: Option<CorrelationId>,
}

impl Message {
    /// Creates a message stamped with the clock's current time.
    #[must_use]
    pub fn new(payload: MessagePayload, clock: &impl Clock) -> Self {
        Self::at(payload, clock.utc())
    }

    /// Creates a message with an explicit timestamp.
    #[must_use]
    pub fn at(payload: MessagePayload, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::new(),
            payload,
            timestamp,
            correlation_id: None,
            reply_to: None,
        }
    }

    /// Creates a reply addressed to `request`.
    ///
    /// When the request carries no correlation identifier the reply is a
    /// plain message that resolves nothing.
    #[must_use]
    pub fn reply(request: &Self, payload: MessagePayload, clock: &impl Clock) -> Self {
        let mut reply = Self::new(payload, clock);
        reply.reply_to = request.correlation_id;
        reply
    }

    /// Sets the correlation identifier.
    #[must_use]
    pub const fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Marks this message as the reply to `correlation_id`.
    #[must_use]
    pub const fn with_reply_to(mut self, correlation_id: CorrelationId) -> Self {
        self.reply_to = Some(correlation_id);
        self
    }

    /// Returns the message identifier.
    #[must_use]
    pub const fn id(&self) -> MessageId {
        self.id
    }

    /// Returns the message type derived from the payload.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    /// Returns the payload.
    #[must_use]
    pub const fn payload(&self) -> &MessagePayload {
        &self.payload
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the correlation identifier, if any.
    #[must_use]
    pub const fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }

    /// Returns the request this message replies to, if any.
    #[must_use]
    pub const fn reply_to(&self) -> Option<CorrelationId> {
        self.reply_to
    }
}
