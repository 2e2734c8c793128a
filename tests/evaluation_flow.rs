//! End-to-end evaluation flow through the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use assay::bus::{
    domain::{MessagePayload, MessageType},
    services::{HistoryFilter, MessageBus},
};
use assay::config::OrchestratorConfig;
use assay::ids::EvaluationId;
use assay::limiter::domain::{ConnectionId, LimiterError, UserId};
use assay::orchestrator::{Orchestrator, OrchestratorError};
use assay::pipeline::{adapters::InMemoryQueueBackend, services::PipelineError};
use assay::progress::domain::EvaluationState;
use assay::scheduler::{adapters::ScriptedAgent, domain::AgentType};
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use serde_json::json;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

const FAST_QUEUES: &str = r#"{
    "pipeline": {
        "evaluation": { "poll_interval_ms": 5 },
        "agent": {
            "concurrency": 4,
            "poll_interval_ms": 5,
            "default_options": { "attempts": 2, "backoff": { "type": "fixed", "delay_ms": 5 } }
        },
        "results": { "poll_interval_ms": 5 }
    },
    "limiter": { "max_connections_per_user": 2, "max_total_connections": 3 }
}"#;

type TestOrchestrator = Orchestrator<InMemoryQueueBackend, DefaultClock>;

fn agent(name: &str) -> AgentType {
    AgentType::new(name).expect("valid agent type")
}

#[fixture]
fn orchestrator() -> TestOrchestrator {
    let config = OrchestratorConfig::from_json_str(FAST_QUEUES).expect("valid configuration");
    Orchestrator::new(
        config,
        Arc::new(InMemoryQueueBackend::new()),
        Arc::new(DefaultClock),
    )
}

async fn register_agents(orchestrator: &TestOrchestrator) {
    let agents = [
        ScriptedAgent::new(agent("market-analysis")),
        ScriptedAgent::new(agent("technical-feasibility")),
        ScriptedAgent::new(agent("financial-modeling")).depending_on([agent("market-analysis")]),
        ScriptedAgent::new(agent("risk-assessment"))
            .depending_on([agent("financial-modeling"), agent("technical-feasibility")]),
    ];
    for scripted in agents {
        orchestrator
            .registry()
            .register(Arc::new(scripted))
            .await
            .expect("registration should succeed");
    }
}

async fn outcome(bus: &MessageBus, evaluation_id: EvaluationId) -> MessagePayload {
    timeout(WAIT, async {
        loop {
            let terminal = bus
                .history(HistoryFilter::default().for_evaluation(evaluation_id))
                .into_iter()
                .find(|message| {
                    matches!(
                        message.message_type(),
                        MessageType::EvaluationComplete | MessageType::EvaluationError
                    )
                });
            if let Some(message) = terminal {
                return message.payload().clone();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("evaluation should finish in time")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn evaluation_runs_every_registered_agent(orchestrator: TestOrchestrator) {
    register_agents(&orchestrator).await;
    orchestrator.start().expect("orchestrator should start");

    let (evaluation_id, _) = orchestrator
        .submit("meal kits for climbers", Vec::new(), json!({ "region": "EU" }))
        .await
        .expect("submission should succeed");

    let MessagePayload::EvaluationComplete {
        results,
        failed_agents,
        ..
    } = outcome(orchestrator.bus(), evaluation_id).await
    else {
        panic!("expected evaluation to complete");
    };
    assert!(failed_agents.is_empty());
    assert_eq!(results.len(), 4);
    let risk = results
        .get(&agent("risk-assessment"))
        .expect("risk assessment result");
    assert_eq!(
        risk["inputs"],
        json!(["financial_modeling", "technical_feasibility"])
    );

    timeout(WAIT, async {
        while orchestrator.pipeline().is_active(evaluation_id) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("run should be released in time");
    let progress = orchestrator
        .aggregator()
        .get_evaluation_progress(evaluation_id)
        .expect("progress should be tracked");
    assert_eq!(progress.state(), EvaluationState::Completed);
    assert_eq!(progress.overall_progress(), 100);

    orchestrator.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn status_reports_every_component(orchestrator: TestOrchestrator) {
    register_agents(&orchestrator).await;
    orchestrator.start().expect("orchestrator should start");

    let status = orchestrator.status().await.expect("status should load");

    assert_eq!(status.registered_agents, 4);
    assert_eq!(status.active_evaluations, 0);
    assert_eq!(status.queues.len(), 3);
    assert_eq!(status.limiter.active_connections, 0);

    orchestrator.shutdown().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn shutdown_is_final(orchestrator: TestOrchestrator) {
    orchestrator.start().expect("orchestrator should start");
    assert!(orchestrator.is_running());

    orchestrator.shutdown().await;
    orchestrator.shutdown().await;

    assert!(!orchestrator.is_running());
    assert!(orchestrator.bus().is_shut_down());
    assert!(matches!(
        orchestrator.start(),
        Err(OrchestratorError::ShutDown)
    ));
    let submitted = orchestrator
        .submit("too late", Vec::new(), json!({}))
        .await;
    assert!(matches!(
        submitted,
        Err(OrchestratorError::Pipeline(PipelineError::Closed))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn configured_connection_caps_apply(orchestrator: TestOrchestrator) {
    let limiter = orchestrator.limiter();
    let user = UserId::new("founder");

    limiter
        .add_connection(&user, &ConnectionId::new("tab-1"))
        .expect("first connection admitted");
    limiter
        .add_connection(&user, &ConnectionId::new("tab-2"))
        .expect("second connection admitted");
    let refused = limiter.add_connection(&user, &ConnectionId::new("tab-3"));

    assert!(matches!(
        refused,
        Err(LimiterError::ConnectionLimitExceeded(_))
    ));
    assert_eq!(limiter.get_metrics().rejected_connections, 1);
}
