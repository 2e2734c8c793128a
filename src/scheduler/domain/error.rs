//! Error types for scheduler domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing scheduler domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerDomainError {
    /// The agent type is empty after trimming.
    #[error("agent type must not be empty")]
    EmptyAgentType,

    /// The agent type contains characters outside `[a-z0-9_]`.
    #[error(
        "agent type '{0}' contains invalid characters (only lowercase alphanumeric and underscores allowed)"
    )]
    InvalidAgentType(String),

    /// The agent type exceeds the 64-character limit.
    #[error("agent type exceeds 64 character limit: {0}")]
    AgentTypeTooLong(String),
}

/// Error returned while parsing an agent health status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown agent health status: {0}")]
pub struct ParseAgentHealthStatusError(pub String);
