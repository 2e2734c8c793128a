//! Unit tests for the agent registry service.

use crate::bus::{
    adapters::FnHandler,
    domain::{BusConfig, Message, MessagePayload, MessageType},
    ports::HandlerResult,
    services::MessageBus,
};
use crate::clock::ManualClock;
use crate::ids::EvaluationId;
use crate::scheduler::{
    adapters::ScriptedAgent,
    domain::{AgentCapabilities, AgentHealthStatus, AgentType, RegistryConfig},
    ports::{Agent, AgentContext, AgentError, AgentRequest, MockAgent},
    services::{AgentRegistry, RegistryError},
};
use rstest::{fixture, rstest};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn agent(name: &str) -> AgentType {
    AgentType::new(name).expect("valid agent type")
}

struct Harness {
    bus: MessageBus,
    registry: AgentRegistry<ManualClock>,
}

#[fixture]
fn harness() -> Harness {
    let bus = MessageBus::new(BusConfig::default());
    let registry = AgentRegistry::new(
        RegistryConfig {
            health_check_interval_ms: 1_000,
            health_check_timeout_ms: 50,
        },
        bus.clone(),
        Arc::new(ManualClock::default()),
    );
    Harness { bus, registry }
}

async fn register_diamond(registry: &AgentRegistry<ManualClock>) {
    let agents = [
        ScriptedAgent::new(agent("market_research")),
        ScriptedAgent::new(agent("competitor_analysis"))
            .depending_on([agent("market_research")]),
        ScriptedAgent::new(agent("customer_research")).depending_on([agent("market_research")]),
        ScriptedAgent::new(agent("financial_analysis"))
            .depending_on([agent("competitor_analysis"), agent("customer_research")]),
    ];
    for scripted in agents {
        registry
            .register(Arc::new(scripted))
            .await
            .expect("registration should succeed");
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn register_initializes_and_lists_agents(harness: Harness) {
    let scripted = Arc::new(ScriptedAgent::new(agent("market_research")));
    let descriptor = harness
        .registry
        .register(Arc::clone(&scripted) as Arc<dyn Agent>)
        .await
        .expect("registration should succeed");

    assert_eq!(descriptor.agent_type(), &agent("market_research"));
    assert_eq!(descriptor.health().status(), AgentHealthStatus::Unknown);
    assert!(scripted.is_initialized());
    assert_eq!(harness.registry.len(), 1);
    assert_eq!(harness.registry.list(), vec![descriptor]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_registration_is_rejected(harness: Harness) {
    register_diamond(&harness.registry).await;

    let result = harness
        .registry
        .register(Arc::new(ScriptedAgent::new(agent("market_research"))))
        .await;

    assert_eq!(
        result,
        Err(RegistryError::DuplicateAgent(agent("market_research")))
    );
    assert_eq!(harness.registry.len(), 4);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn losing_concurrent_registration_releases_its_agent(harness: Harness) {
    let rival = harness.registry.clone();
    let mut mock = MockAgent::new();
    mock.expect_agent_type()
        .returning(|| AgentType::new("market_research").expect("valid agent type"));
    mock.expect_is_initialized().return_const(false);
    mock.expect_capabilities().returning(AgentCapabilities::new);
    // Another registration for the same type lands while this one starts.
    mock.expect_initialize().times(1).returning(move || {
        let winner = rival.clone();
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(
                winner.register(Arc::new(ScriptedAgent::new(agent("market_research")))),
            )
        })
        .map(|_| ())
        .map_err(|err| AgentError::Initialization(err.to_string()))
    });
    mock.expect_cleanup().times(1).returning(|| Ok(()));

    let result = harness.registry.register(Arc::new(mock)).await;

    assert_eq!(
        result,
        Err(RegistryError::DuplicateAgent(agent("market_research")))
    );
    assert_eq!(harness.registry.len(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_initialization_is_not_registered(harness: Harness) {
    let mut mock = MockAgent::new();
    mock.expect_agent_type()
        .returning(|| AgentType::new("broken").expect("valid agent type"));
    mock.expect_is_initialized().return_const(false);
    mock.expect_initialize()
        .times(1)
        .returning(|| Err(AgentError::Initialization("no credentials".to_owned())));

    let result = harness.registry.register(Arc::new(mock)).await;

    assert!(matches!(
        result,
        Err(RegistryError::Initialization { ref agent_type, .. }) if agent_type.as_str() == "broken"
    ));
    assert!(harness.registry.is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unregister_runs_cleanup_and_rebuilds_graph(harness: Harness) {
    let root = Arc::new(ScriptedAgent::new(agent("market_research")));
    harness
        .registry
        .register(Arc::clone(&root) as Arc<dyn Agent>)
        .await
        .expect("registration should succeed");
    harness
        .registry
        .register(Arc::new(
            ScriptedAgent::new(agent("competitor_analysis"))
                .depending_on([agent("market_research")]),
        ))
        .await
        .expect("registration should succeed");
    assert!(harness.registry.validate_dependencies().is_valid());

    harness
        .registry
        .unregister(&agent("market_research"))
        .await
        .expect("unregister should succeed");

    assert!(root.is_cleaned_up());
    let validation = harness.registry.validate_dependencies();
    assert_eq!(
        validation.messages(),
        vec!["competitor_analysis depends on unregistered agent market_research".to_owned()]
    );
    assert_eq!(
        harness.registry.execution_order().unscheduled(),
        &[agent("competitor_analysis")]
    );

    let missing = harness.registry.unregister(&agent("market_research")).await;
    assert_eq!(
        missing,
        Err(RegistryError::UnknownAgent(agent("market_research")))
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn ordering_and_groups_follow_dependencies(harness: Harness) {
    register_diamond(&harness.registry).await;

    let plan = harness.registry.execution_order();
    assert_eq!(plan.len(), 4);
    assert_eq!(plan.level_of(&agent("financial_analysis")), Some(2));

    let groups = harness.registry.parallel_execution_groups();
    let sizes: Vec<usize> = groups.iter().map(|group| group.agents().len()).collect();
    assert_eq!(sizes, vec![1, 2, 1]);
    assert!(groups.iter().all(|group| group.is_parallel()));

    let node = harness
        .registry
        .node(&agent("customer_research"))
        .expect("node exists");
    assert_eq!(node.execution_order(), Some(1));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn plan_for_includes_transitive_dependencies(harness: Harness) {
    register_diamond(&harness.registry).await;

    let plan = harness
        .registry
        .plan_for(&[agent("competitor_analysis")])
        .expect("plan should succeed");

    assert_eq!(
        plan.order(),
        vec![agent("market_research"), agent("competitor_analysis")]
    );
    assert_eq!(
        harness.registry.plan_for(&[agent("nobody")]),
        Err(RegistryError::UnknownAgent(agent("nobody")))
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn plan_for_rejects_cycles(harness: Harness) {
    for (name, dependency) in [("alpha", "beta"), ("beta", "alpha")] {
        harness
            .registry
            .register(Arc::new(
                ScriptedAgent::new(agent(name)).depending_on([agent(dependency)]),
            ))
            .await
            .expect("registration should succeed");
    }

    let result = harness.registry.plan_for(&[agent("alpha")]);

    assert!(matches!(result, Err(RegistryError::CycleDetected { .. })));
    assert!(!harness.registry.validate_dependencies().is_valid());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn can_agent_execute_checks_completed_set(harness: Harness) {
    register_diamond(&harness.registry).await;
    let mut completed = HashSet::new();

    assert!(!harness
        .registry
        .can_agent_execute(&agent("competitor_analysis"), &completed));
    completed.insert(agent("market_research"));
    assert!(harness
        .registry
        .can_agent_execute(&agent("competitor_analysis"), &completed));
    assert!(!harness
        .registry
        .can_agent_execute(&agent("ghost"), &completed));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn execute_delegates_to_agent(harness: Harness) {
    harness
        .registry
        .register(Arc::new(
            ScriptedAgent::new(agent("market_research")).with_output(json!({"tam": 42})),
        ))
        .await
        .expect("registration should succeed");

    let request = AgentRequest::new(EvaluationId::new(), "Dog walking marketplace");
    let output = harness
        .registry
        .execute(&agent("market_research"), &request, &AgentContext::new())
        .await
        .expect("execution should succeed");

    assert_eq!(output.data(), &json!({"tam": 42}));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn execute_wraps_agent_failures(harness: Harness) {
    harness
        .registry
        .register(Arc::new(
            ScriptedAgent::new(agent("market_research")).always_failing(),
        ))
        .await
        .expect("registration should succeed");

    let request = AgentRequest::new(EvaluationId::new(), "idea");
    let result = harness
        .registry
        .execute(&agent("market_research"), &request, &AgentContext::new())
        .await;

    assert!(matches!(result, Err(RegistryError::Execution { .. })));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn every_failed_probe_is_announced_until_recovery(harness: Harness) {
    let seen: Arc<Mutex<Vec<AgentHealthStatus>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _subscription = harness.bus.subscribe(
        MessageType::AgentHealth,
        FnHandler::new("health-recorder", move |message: Message| {
            if let MessagePayload::AgentHealth { status, .. } = message.payload() {
                sink.lock().expect("sink lock").push(*status);
            }
            std::future::ready(HandlerResult::Ok(()))
        }),
    );

    let scripted = Arc::new(ScriptedAgent::new(agent("market_research")));
    harness
        .registry
        .register(Arc::clone(&scripted) as Arc<dyn Agent>)
        .await
        .expect("registration should succeed");

    let first = harness.registry.check_health().await;
    assert_eq!(
        first.first().map(|outcome| outcome.current),
        Some(AgentHealthStatus::Healthy)
    );

    scripted.set_healthy(false);
    let second = harness.registry.check_health().await;
    assert_eq!(
        second.first().map(|outcome| outcome.current),
        Some(AgentHealthStatus::Error)
    );
    assert!(harness.registry.contains(&agent("market_research")));
    assert!(harness.registry.healthy_agents().is_empty());
    harness.registry.check_health().await;

    scripted.set_healthy(true);
    harness.registry.check_health().await;

    assert_eq!(
        *seen.lock().expect("seen lock"),
        vec![
            AgentHealthStatus::Error,
            AgentHealthStatus::Error,
            AgentHealthStatus::Healthy
        ]
    );
    assert_eq!(
        harness.registry.healthy_agents(),
        vec![agent("market_research")]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn slow_probe_times_out(harness: Harness) {
    harness
        .registry
        .register(Arc::new(
            ScriptedAgent::new(agent("sluggish")).with_probe_delay(Duration::from_millis(500)),
        ))
        .await
        .expect("registration should succeed");

    let outcomes = harness.registry.check_health().await;

    assert_eq!(
        outcomes.first().map(|outcome| outcome.current),
        Some(AgentHealthStatus::Error)
    );
    let descriptor = harness
        .registry
        .get(&agent("sluggish"))
        .expect("agent stays registered");
    assert!(
        descriptor
            .health()
            .message()
            .is_some_and(|message| message.contains("timed out"))
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn probe_error_from_agent_is_recorded(harness: Harness) {
    let mut mock = MockAgent::new();
    mock.expect_agent_type()
        .returning(|| AgentType::new("flaky").expect("valid agent type"));
    mock.expect_is_initialized().return_const(true);
    mock.expect_capabilities().returning(AgentCapabilities::new);
    mock.expect_health_check()
        .times(1)
        .returning(|| Err(AgentError::Unhealthy("database offline".to_owned())));
    harness
        .registry
        .register(Arc::new(mock))
        .await
        .expect("registration should succeed");

    let outcomes = harness.registry.check_health().await;

    let outcome = outcomes.first().expect("one outcome");
    assert_eq!(outcome.previous, AgentHealthStatus::Unknown);
    assert_eq!(outcome.current, AgentHealthStatus::Error);
    assert!(outcome.changed());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn agents_providing_filters_by_capability(harness: Harness) {
    harness
        .registry
        .register(Arc::new(
            ScriptedAgent::new(agent("market_research"))
                .with_capabilities(AgentCapabilities::new().providing(["market_size"])),
        ))
        .await
        .expect("registration should succeed");
    harness
        .registry
        .register(Arc::new(ScriptedAgent::new(agent("risk_assessment"))))
        .await
        .expect("registration should succeed");

    assert_eq!(
        harness.registry.agents_providing("market_size"),
        vec![agent("market_research")]
    );
}
