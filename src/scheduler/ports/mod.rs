//! Port abstractions for analysis agents.

pub mod agent;

pub use agent::{
    Agent, AgentContext, AgentError, AgentHealthReport, AgentOutput, AgentRequest, AgentResult,
    ProgressReporter,
};

#[cfg(test)]
pub use agent::MockAgent;
