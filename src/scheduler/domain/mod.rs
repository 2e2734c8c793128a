//! Domain model for agents and their dependency graph.
//!
//! Agents are identified by a validated [`AgentType`]. The
//! [`DependencyGraph`] is rebuilt from agent declarations whenever the agent
//! set changes and owns cycle detection, topological levelling and parallel
//! grouping.

mod agent_type;
mod capabilities;
mod config;
mod descriptor;
mod error;
mod graph;
mod health;

pub use agent_type::AgentType;
pub use capabilities::AgentCapabilities;
pub use config::RegistryConfig;
pub use descriptor::AgentDescriptor;
pub use error::{ParseAgentHealthStatusError, SchedulerDomainError};
pub use graph::{
    DependencyGraph, DependencyIssue, DependencyNode, DependencyValidation, ExecutionGroup,
    ExecutionPlan,
};
pub use health::{AgentHealthSnapshot, AgentHealthStatus};
