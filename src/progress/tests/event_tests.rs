//! Unit tests for the bus-facing progress handler.

use crate::bus::{
    domain::{BusConfig, MessagePayload, MessageType},
    services::{HistoryFilter, MessageBus},
};
use crate::clock::ManualClock;
use crate::ids::EvaluationId;
use crate::progress::{
    domain::{AgentRunStatus, EvaluationState, ProgressConfig},
    services::{ProgressAggregator, ProgressEventHandler},
};
use crate::scheduler::domain::AgentType;
use rstest::{fixture, rstest};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

fn agent(name: &str) -> AgentType {
    AgentType::new(name).expect("valid agent type")
}

struct Harness {
    bus: MessageBus,
    aggregator: ProgressAggregator<ManualClock>,
    evaluation_id: EvaluationId,
}

#[fixture]
fn harness() -> Harness {
    let bus = MessageBus::new(BusConfig::default());
    let aggregator = ProgressAggregator::new(
        ProgressConfig::default(),
        Arc::new(ManualClock::default()),
    );
    let subscriptions = ProgressEventHandler::subscribe_all(&aggregator, &bus);
    assert_eq!(subscriptions.len(), 6);
    let evaluation_id = EvaluationId::new();
    aggregator.initialize_evaluation(evaluation_id, [agent("market_research"), agent("risk")]);
    Harness {
        bus,
        aggregator,
        evaluation_id,
    }
}

async fn publish(harness: &Harness, payload: MessagePayload) {
    harness
        .bus
        .publish(harness.bus.message(payload))
        .await
        .expect("publish succeeds");
}

#[rstest]
#[tokio::test]
async fn lifecycle_messages_update_snapshot(harness: Harness) {
    let evaluation_id = harness.evaluation_id;
    publish(
        &harness,
        MessagePayload::AgentStart {
            evaluation_id,
            agent_type: agent("market_research"),
        },
    )
    .await;
    publish(
        &harness,
        MessagePayload::AgentProgress {
            evaluation_id,
            agent_type: agent("risk"),
            percentage: 50,
            note: None,
        },
    )
    .await;
    publish(
        &harness,
        MessagePayload::AgentComplete {
            evaluation_id,
            agent_type: agent("market_research"),
            result: json!({"score": 7}),
        },
    )
    .await;

    let snapshot = harness
        .aggregator
        .get_evaluation_progress(evaluation_id)
        .expect("snapshot");
    assert_eq!(snapshot.overall_progress(), 75);
    assert_eq!(
        snapshot
            .agent(&agent("market_research"))
            .map(|entry| entry.status()),
        Some(AgentRunStatus::Completed)
    );
    assert_eq!(snapshot.state(), EvaluationState::Running);
}

#[rstest]
#[tokio::test]
async fn status_updates_are_published(harness: Harness) {
    let evaluation_id = harness.evaluation_id;
    publish(
        &harness,
        MessagePayload::AgentProgress {
            evaluation_id,
            agent_type: agent("risk"),
            percentage: 20,
            note: Some("collecting".to_owned()),
        },
    )
    .await;

    let statuses = harness
        .bus
        .history(HistoryFilter::default().of_type(MessageType::EvaluationStatus));
    let last = statuses.last().expect("status published");
    assert!(matches!(
        last.payload(),
        MessagePayload::EvaluationStatus {
            overall_progress: 10,
            state: EvaluationState::Running,
            ..
        }
    ));
}

#[rstest]
#[tokio::test]
async fn evaluation_outcomes_are_recorded(harness: Harness) {
    let evaluation_id = harness.evaluation_id;
    publish(
        &harness,
        MessagePayload::EvaluationComplete {
            evaluation_id,
            results: BTreeMap::new(),
            failed_agents: Vec::new(),
        },
    )
    .await;

    let snapshot = harness
        .aggregator
        .get_evaluation_progress(evaluation_id)
        .expect("snapshot");
    assert_eq!(snapshot.state(), EvaluationState::Completed);
}

#[rstest]
#[tokio::test]
async fn untracked_evaluations_are_ignored(harness: Harness) {
    let report = harness
        .bus
        .publish(harness.bus.message(MessagePayload::AgentStart {
            evaluation_id: EvaluationId::new(),
            agent_type: agent("risk"),
        }))
        .await
        .expect("publish succeeds");

    assert_eq!(report.handlers_invoked, 0);
    assert!(report.is_clean());
}

#[rstest]
#[tokio::test]
async fn unknown_agent_surfaces_handler_error(harness: Harness) {
    let report = harness
        .bus
        .publish(harness.bus.message(MessagePayload::AgentStart {
            evaluation_id: harness.evaluation_id,
            agent_type: agent("ghost"),
        }))
        .await
        .expect("publish succeeds");

    assert_eq!(report.failures.len(), 1);
}
