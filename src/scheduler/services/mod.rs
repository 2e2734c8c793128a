//! Registry service coordinating agents and their dependency graph.

mod registry;

pub use registry::{AgentRegistry, HealthCheckOutcome, RegistryError, RegistryResult};
