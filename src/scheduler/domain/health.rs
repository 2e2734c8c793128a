//! Agent health status domain types.

use super::ParseAgentHealthStatusError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Health of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentHealthStatus {
    /// Health has not been probed yet.
    Unknown,
    /// The agent answered its probe and is healthy.
    Healthy,
    /// The agent answered but reported reduced service.
    Degraded,
    /// The probe failed or timed out.
    Error,
}

impl AgentHealthStatus {
    /// Returns the canonical representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Error => "error",
        }
    }

    /// Returns whether the agent can be scheduled.
    #[must_use]
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Unknown | Self::Healthy | Self::Degraded)
    }
}

impl fmt::Display for AgentHealthStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AgentHealthStatus {
    type Error = ParseAgentHealthStatusError;

    fn try_from(value: &str) -> Result<Self, ParseAgentHealthStatusError> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "unknown" => Ok(Self::Unknown),
            "healthy" => Ok(Self::Healthy),
            "degraded" => Ok(Self::Degraded),
            "error" => Ok(Self::Error),
            _ => Err(ParseAgentHealthStatusError(value.to_owned())),
        }
    }
}

/// Timestamped result of the latest health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentHealthSnapshot {
    status: AgentHealthStatus,
    checked_at: DateTime<Utc>,
    version: Option<String>,
    message: Option<String>,
}

impl AgentHealthSnapshot {
    /// Creates a health snapshot.
    #[must_use]
    pub const fn new(status: AgentHealthStatus, checked_at: DateTime<Utc>) -> Self {
        Self {
            status,
            checked_at,
            version: None,
            message: None,
        }
    }

    /// Creates an `unknown` snapshot.
    #[must_use]
    pub const fn unknown(checked_at: DateTime<Utc>) -> Self {
        Self::new(AgentHealthStatus::Unknown, checked_at)
    }

    /// Creates an `error` snapshot with details.
    #[must_use]
    pub fn error(checked_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self::new(AgentHealthStatus::Error, checked_at).with_message(message)
    }

    /// Records the agent version reported by the probe.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        let normalized = version.into().trim().to_owned();
        if !normalized.is_empty() {
            self.version = Some(normalized);
        }
        self
    }

    /// Adds an explanatory message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let normalized = message.into().trim().to_owned();
        if !normalized.is_empty() {
            self.message = Some(normalized);
        }
        self
    }

    /// Returns the health status.
    #[must_use]
    pub const fn status(&self) -> AgentHealthStatus {
        self.status
    }

    /// Returns the probe timestamp.
    #[must_use]
    pub const fn checked_at(&self) -> DateTime<Utc> {
        self.checked_at
    }

    /// Returns the reported agent version, if any.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Returns an optional detail message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}
