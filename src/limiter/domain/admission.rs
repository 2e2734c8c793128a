//! Structured admission decisions.

use super::{LimiterError, LimiterResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Why a connection or message was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenialReason {
    /// The user already holds the maximum number of connections.
    UserConnectionLimit {
        /// Configured per-user cap.
        limit: usize,
    },
    /// The service already holds the maximum number of connections.
    GlobalConnectionLimit {
        /// Configured global cap.
        limit: usize,
    },
    /// The connection identifier is already registered.
    DuplicateConnection,
    /// The one-second message budget is spent.
    PerSecondLimit {
        /// Configured per-second budget.
        limit: u32,
    },
    /// The one-minute message budget is spent.
    PerMinuteLimit {
        /// Configured per-minute budget.
        limit: u32,
    },
    /// The connection is not registered.
    ConnectionNotFound,
}

impl DenialReason {
    /// Returns whether the denial concerns connection admission.
    #[must_use]
    pub const fn is_connection_limit(self) -> bool {
        matches!(
            self,
            Self::UserConnectionLimit { .. }
                | Self::GlobalConnectionLimit { .. }
                | Self::DuplicateConnection
        )
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserConnectionLimit { limit } => {
                write!(f, "User connection limit exceeded ({limit})")
            }
            Self::GlobalConnectionLimit { limit } => {
                write!(f, "Global connection limit exceeded ({limit})")
            }
            Self::DuplicateConnection => f.write_str("Connection already registered"),
            Self::PerSecondLimit { limit } => {
                write!(f, "Rate limit exceeded: {limit} messages per second")
            }
            Self::PerMinuteLimit { limit } => {
                write!(f, "Rate limit exceeded: {limit} messages per minute")
            }
            Self::ConnectionNotFound => f.write_str("Connection not found"),
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<DenialReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wait_ms: Option<u64>,
}

impl Admission {
    /// An approval.
    #[must_use]
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            wait_ms: None,
        }
    }

    /// A denial without a retry hint.
    #[must_use]
    pub const fn deny(reason: DenialReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            wait_ms: None,
        }
    }

    /// A denial that clears after `wait`.
    #[must_use]
    pub fn deny_for(reason: DenialReason, wait: Duration) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            wait_ms: Some(u64::try_from(wait.as_millis()).unwrap_or(u64::MAX).max(1)),
        }
    }

    /// Returns whether the action may proceed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Returns the denial reason.
    #[must_use]
    pub const fn reason(&self) -> Option<DenialReason> {
        self.reason
    }

    /// Returns how long to wait before retrying.
    #[must_use]
    pub fn wait(&self) -> Option<Duration> {
        self.wait_ms.map(Duration::from_millis)
    }

    /// Converts a denial into the matching [`LimiterError`].
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::ConnectionLimitExceeded`] for connection
    /// denials, [`LimiterError::UnknownConnection`] for unknown connections
    /// and [`LimiterError::RateLimitExceeded`] otherwise.
    pub fn into_result(self) -> LimiterResult<()> {
        match self.reason {
            None => Ok(()),
            Some(DenialReason::ConnectionNotFound) => Err(LimiterError::UnknownConnection),
            Some(reason) if reason.is_connection_limit() => {
                Err(LimiterError::ConnectionLimitExceeded(reason))
            }
            Some(reason) => Err(LimiterError::RateLimitExceeded {
                reason,
                wait: self.wait().unwrap_or_default(),
            }),
        }
    }
}
