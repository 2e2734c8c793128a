//! Given steps for dependency scheduling BDD scenarios.

use std::sync::Arc;

use super::world::{SchedulingWorld, agent_list, run_async};
use assay::scheduler::{adapters::ScriptedAgent, domain::AgentType};
use eyre::WrapErr;
use rstest_bdd_macros::given;

fn register(
    world: &SchedulingWorld,
    name: &str,
    dependencies: Vec<AgentType>,
) -> Result<(), eyre::Report> {
    let agent_type = AgentType::new(name).map_err(|err| eyre::eyre!("bad agent type: {err}"))?;
    let agent = ScriptedAgent::new(agent_type).depending_on(dependencies);
    run_async(world.registry.register(Arc::new(agent)))
        .wrap_err_with(|| format!("register {name}"))?;
    Ok(())
}

#[given(r#"an independent agent "{name}""#)]
fn independent_agent(world: &mut SchedulingWorld, name: String) -> Result<(), eyre::Report> {
    register(world, &name, Vec::new())
}

#[given(r#"a registered agent "{name}" depending on "{dependencies}""#)]
fn registered_agent_with_dependencies(
    world: &mut SchedulingWorld,
    name: String,
    dependencies: String,
) -> Result<(), eyre::Report> {
    register(world, &name, agent_list(&dependencies)?)
}
