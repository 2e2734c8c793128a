//! When steps for dependency scheduling BDD scenarios.

use super::world::{SchedulingWorld, agent_list};
use rstest_bdd_macros::when;

#[when("the full execution plan is computed")]
fn compute_full_plan(world: &mut SchedulingWorld) {
    world.last_plan = Some(Ok(world.registry.execution_order()));
}

#[when(r#"a plan for "{names}" is requested"#)]
fn request_plan(world: &mut SchedulingWorld, names: String) -> Result<(), eyre::Report> {
    let requested = agent_list(&names)?;
    world.last_plan = Some(world.registry.plan_for(&requested));
    Ok(())
}
