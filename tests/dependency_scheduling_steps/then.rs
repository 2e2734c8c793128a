//! Then steps for dependency scheduling BDD scenarios.

use super::world::{SchedulingWorld, agent_list};
use assay::scheduler::{domain::AgentType, services::RegistryError};
use rstest_bdd_macros::then;

#[then(r#"level {level:usize} contains "{names}""#)]
fn level_contains(
    world: &mut SchedulingWorld,
    level: usize,
    names: String,
) -> Result<(), eyre::Report> {
    let plan = world.plan()?;
    let expected = agent_list(&names)?;
    let actual = plan
        .levels()
        .get(level)
        .ok_or_else(|| eyre::eyre!("plan has no level {level}"))?;
    if actual != &expected {
        return Err(eyre::eyre!("expected level {level} to be {expected:?}, found {actual:?}"));
    }
    Ok(())
}

#[then(r#"the planned order is "{names}""#)]
fn planned_order(world: &mut SchedulingWorld, names: String) -> Result<(), eyre::Report> {
    let order = world.plan()?.order();
    let expected = agent_list(&names)?;
    if order != expected {
        return Err(eyre::eyre!("expected order {expected:?}, found {order:?}"));
    }
    Ok(())
}

#[then("planning fails with a circular dependency")]
fn planning_fails_with_cycle(world: &mut SchedulingWorld) -> Result<(), eyre::Report> {
    match world.last_plan.as_ref() {
        Some(Err(RegistryError::CycleDetected { issues })) if !issues.is_empty() => Ok(()),
        other => Err(eyre::eyre!("expected a cycle error, found {other:?}")),
    }
}

#[then(r#"planning fails because "{name}" is not registered"#)]
fn planning_fails_unknown(world: &mut SchedulingWorld, name: String) -> Result<(), eyre::Report> {
    let expected = AgentType::new(name).map_err(|err| eyre::eyre!("bad agent type: {err}"))?;
    match world.last_plan.as_ref() {
        Some(Err(RegistryError::UnknownAgent(agent))) if *agent == expected => Ok(()),
        other => Err(eyre::eyre!("expected unknown agent error, found {other:?}")),
    }
}

#[then(r#""{name}" is not scheduled"#)]
fn not_scheduled(world: &mut SchedulingWorld, name: String) -> Result<(), eyre::Report> {
    let agent = AgentType::new(name).map_err(|err| eyre::eyre!("bad agent type: {err}"))?;
    let plan = world.plan()?;
    if plan.level_of(&agent).is_some() || !plan.unscheduled().contains(&agent) {
        return Err(eyre::eyre!("expected {agent} to be unscheduled"));
    }
    Ok(())
}

#[then("dependency validation reports {count:usize} issue")]
fn validation_issue_count(world: &mut SchedulingWorld, count: usize) -> Result<(), eyre::Report> {
    let validation = world.registry.validate_dependencies();
    if validation.issues().len() != count {
        return Err(eyre::eyre!(
            "expected {count} issues, found {:?}",
            validation.messages()
        ));
    }
    Ok(())
}
