//! Behaviour tests for dependency-ordered agent scheduling.

mod dependency_scheduling_steps;

use dependency_scheduling_steps::world::{SchedulingWorld, world};
use rstest_bdd_macros::scenario;

#[scenario(
    path = "tests/features/dependency_scheduling.feature",
    name = "Independent agents share the first level"
)]
#[tokio::test(flavor = "multi_thread")]
async fn independent_agents_share_level(world: SchedulingWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/dependency_scheduling.feature",
    name = "Requesting an agent pulls in its dependencies"
)]
#[tokio::test(flavor = "multi_thread")]
async fn requested_agent_pulls_dependencies(world: SchedulingWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/dependency_scheduling.feature",
    name = "A circular dependency is reported"
)]
#[tokio::test(flavor = "multi_thread")]
async fn circular_dependency_reported(world: SchedulingWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/dependency_scheduling.feature",
    name = "A missing dependency leaves the agent unscheduled"
)]
#[tokio::test(flavor = "multi_thread")]
async fn missing_dependency_unscheduled(world: SchedulingWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/dependency_scheduling.feature",
    name = "Requesting an unregistered agent is rejected"
)]
#[tokio::test(flavor = "multi_thread")]
async fn unregistered_agent_rejected(world: SchedulingWorld) {
    let _ = world;
}
