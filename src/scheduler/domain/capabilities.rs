//! Agent capability and dependency declarations.

use super::AgentType;
use serde::{Deserialize, Serialize};

/// What an agent provides, what it requires and which agents must finish
/// before it may run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    provides: Vec<String>,
    requires: Vec<String>,
    dependencies: Vec<AgentType>,
}

impl AgentCapabilities {
    /// Creates an empty declaration with no dependencies.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            provides: Vec::new(),
            requires: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Sets the capabilities this agent provides.
    #[must_use]
    pub fn providing(mut self, capabilities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.provides = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the capabilities this agent requires.
    #[must_use]
    pub fn requiring(mut self, capabilities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.requires = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the agents that must complete before this agent runs.
    ///
    /// Duplicates are dropped, keeping first-seen order.
    #[must_use]
    pub fn depending_on(mut self, agents: impl IntoIterator<Item = AgentType>) -> Self {
        let mut dependencies: Vec<AgentType> = Vec::new();
        for agent in agents {
            if !dependencies.contains(&agent) {
                dependencies.push(agent);
            }
        }
        self.dependencies = dependencies;
        self
    }

    /// Returns the provided capabilities.
    #[must_use]
    pub fn provides(&self) -> &[String] {
        &self.provides
    }

    /// Returns the required capabilities.
    #[must_use]
    pub fn requires(&self) -> &[String] {
        &self.requires
    }

    /// Returns the declared agent dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &[AgentType] {
        &self.dependencies
    }

    /// Returns whether the agent provides `capability`.
    #[must_use]
    pub fn provides_capability(&self, capability: &str) -> bool {
        self.provides.iter().any(|provided| provided == capability)
    }
}
