//! Validated agent type.

use super::SchedulerDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for an agent type.
const MAX_AGENT_TYPE_LENGTH: usize = 64;

/// Unique key of an analysis agent (e.g. `market_research`).
///
/// The value is trimmed and lowercased; hyphens are folded into
/// underscores. Only `[a-z0-9_]` survives validation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentType(String);

impl AgentType {
    /// Creates a validated agent type.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerDomainError::EmptyAgentType`] when the value is
    /// empty after trimming, [`SchedulerDomainError::AgentTypeTooLong`] when
    /// it exceeds 64 characters, or
    /// [`SchedulerDomainError::InvalidAgentType`] when it contains characters
    /// outside `[a-z0-9_]`.
    pub fn new(value: impl Into<String>) -> Result<Self, SchedulerDomainError> {
        let raw = value.into();
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");

        if normalized.is_empty() {
            return Err(SchedulerDomainError::EmptyAgentType);
        }

        if normalized.len() > MAX_AGENT_TYPE_LENGTH {
            return Err(SchedulerDomainError::AgentTypeTooLong(raw));
        }

        let is_valid = normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

        if !is_valid {
            return Err(SchedulerDomainError::InvalidAgentType(raw));
        }

        Ok(Self(normalized))
    }

    /// Returns the agent type as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AgentType {
    type Error = SchedulerDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AgentType> for String {
    fn from(value: AgentType) -> Self {
        value.0
    }
}

impl AsRef<str> for AgentType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
