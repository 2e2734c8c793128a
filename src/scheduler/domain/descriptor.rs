//! Registered agent descriptor.

use super::{AgentCapabilities, AgentHealthSnapshot, AgentType};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Registry-owned view of one agent.
///
/// Created at registration, replaced on every health probe and dropped on
/// unregistration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    agent_type: AgentType,
    capabilities: AgentCapabilities,
    health: AgentHealthSnapshot,
    registered_at: DateTime<Utc>,
}

impl AgentDescriptor {
    /// Creates a descriptor with `unknown` health.
    #[must_use]
    pub fn new(agent_type: AgentType, capabilities: AgentCapabilities, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            agent_type,
            capabilities,
            health: AgentHealthSnapshot::unknown(timestamp),
            registered_at: timestamp,
        }
    }

    /// Returns the agent type.
    #[must_use]
    pub const fn agent_type(&self) -> &AgentType {
        &self.agent_type
    }

    /// Returns the capability declaration.
    #[must_use]
    pub const fn capabilities(&self) -> &AgentCapabilities {
        &self.capabilities
    }

    /// Returns the latest health snapshot.
    #[must_use]
    pub const fn health(&self) -> &AgentHealthSnapshot {
        &self.health
    }

    /// Returns the registration timestamp.
    #[must_use]
    pub const fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Returns a descriptor carrying a new health snapshot.
    #[must_use]
    pub fn with_health(mut self, health: AgentHealthSnapshot) -> Self {
        self.health = health;
        self
    }

    /// Returns a descriptor carrying new capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: AgentCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}
