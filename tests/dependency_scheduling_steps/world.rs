//! Shared world state for dependency scheduling BDD scenarios.

use std::sync::Arc;

use assay::bus::{domain::BusConfig, services::MessageBus};
use assay::scheduler::{
    domain::{AgentType, ExecutionPlan, RegistryConfig},
    services::{AgentRegistry, RegistryResult},
};
use mockable::DefaultClock;
use rstest::fixture;

/// Registry type used by the BDD world.
pub type TestRegistry = AgentRegistry<DefaultClock>;

/// Scenario world for scheduling behaviour tests.
pub struct SchedulingWorld {
    /// The registry under test.
    pub registry: TestRegistry,
    /// Result of the last planning request.
    pub last_plan: Option<RegistryResult<ExecutionPlan>>,
}

impl SchedulingWorld {
    /// Creates a world with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let bus = MessageBus::new(BusConfig::default());
        Self {
            registry: AgentRegistry::new(RegistryConfig::default(), bus, Arc::new(DefaultClock)),
            last_plan: None,
        }
    }

    /// Returns the last successful plan.
    pub fn plan(&self) -> Result<&ExecutionPlan, eyre::Report> {
        match self.last_plan.as_ref() {
            Some(Ok(plan)) => Ok(plan),
            Some(Err(err)) => Err(eyre::eyre!("planning failed: {err}")),
            None => Err(eyre::eyre!("no plan computed in scenario world")),
        }
    }
}

impl Default for SchedulingWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> SchedulingWorld {
    SchedulingWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

/// Parses a comma-separated list of agent types.
pub fn agent_list(names: &str) -> Result<Vec<AgentType>, eyre::Report> {
    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| AgentType::new(name).map_err(|err| eyre::eyre!("bad agent type {name}: {err}")))
        .collect()
}
