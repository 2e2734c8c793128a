//! Unit tests for the progress aggregator.

use crate::clock::ManualClock;
use crate::ids::EvaluationId;
use crate::progress::{
    domain::{AgentRunStatus, EvaluationState, ProgressConfig, ProgressError},
    services::ProgressAggregator,
};
use crate::scheduler::domain::AgentType;
use rstest::{fixture, rstest};
use std::sync::Arc;
use std::time::Duration;

fn agent(name: &str) -> AgentType {
    AgentType::new(name).expect("valid agent type")
}

struct Harness {
    clock: Arc<ManualClock>,
    aggregator: ProgressAggregator<ManualClock>,
}

#[fixture]
fn harness() -> Harness {
    let clock = Arc::new(ManualClock::default());
    let aggregator = ProgressAggregator::new(
        ProgressConfig {
            retention_ms: 60_000,
            cleanup_interval_ms: 1_000,
        },
        Arc::clone(&clock),
    );
    Harness { clock, aggregator }
}

fn seed(harness: &Harness) -> EvaluationId {
    let evaluation_id = EvaluationId::new();
    harness
        .aggregator
        .initialize_evaluation(evaluation_id, [agent("a"), agent("b"), agent("c")]);
    evaluation_id
}

#[rstest]
fn initialization_seeds_pending_agents(harness: Harness) {
    let evaluation_id = seed(&harness);

    let snapshot = harness
        .aggregator
        .get_evaluation_progress(evaluation_id)
        .expect("snapshot exists");

    assert_eq!(snapshot.state(), EvaluationState::Pending);
    assert_eq!(snapshot.overall_progress(), 0);
    assert_eq!(snapshot.agents().len(), 3);
    assert!(
        snapshot
            .agents()
            .values()
            .all(|entry| entry.status() == AgentRunStatus::Pending && entry.percentage() == 0)
    );
}

#[rstest]
fn reinitialization_keeps_existing_progress(harness: Harness) {
    let evaluation_id = seed(&harness);
    harness
        .aggregator
        .update_agent_progress(evaluation_id, &agent("a"), AgentRunStatus::Running, 40)
        .expect("update succeeds");

    let again = harness
        .aggregator
        .initialize_evaluation(evaluation_id, [agent("z")]);

    assert_eq!(again.agent(&agent("a")).map(|entry| entry.percentage()), Some(40));
    assert!(again.agent(&agent("z")).is_none());
}

#[rstest]
#[case(-5, 0)]
#[case(105, 100)]
#[case(42, 42)]
fn percentages_are_clamped(harness: Harness, #[case] reported: i64, #[case] stored: u8) {
    let evaluation_id = seed(&harness);

    let snapshot = harness
        .aggregator
        .update_agent_progress(evaluation_id, &agent("a"), AgentRunStatus::Running, reported)
        .expect("update succeeds");

    assert_eq!(
        snapshot.agent(&agent("a")).map(|entry| entry.percentage()),
        Some(stored)
    );
}

#[rstest]
fn overall_progress_is_rounded_mean(harness: Harness) {
    let evaluation_id = seed(&harness);
    harness
        .aggregator
        .update_agent_progress(evaluation_id, &agent("a"), AgentRunStatus::Completed, 0)
        .expect("update succeeds");
    let snapshot = harness
        .aggregator
        .update_agent_progress(evaluation_id, &agent("b"), AgentRunStatus::Running, 100)
        .expect("update succeeds");

    assert_eq!(snapshot.overall_progress(), 67);
    assert_eq!(snapshot.state(), EvaluationState::Running);
    assert_eq!(snapshot.completed_agents(), vec![agent("a")]);
    assert_eq!(snapshot.active_agents(), vec![agent("b")]);
}

#[rstest]
fn terminal_agents_ignore_late_progress(harness: Harness) {
    let evaluation_id = seed(&harness);
    harness
        .aggregator
        .update_agent_progress(evaluation_id, &agent("a"), AgentRunStatus::Completed, 100)
        .expect("update succeeds");

    let snapshot = harness
        .aggregator
        .update_agent_progress(evaluation_id, &agent("a"), AgentRunStatus::Running, 10)
        .expect("update succeeds");

    let entry = snapshot.agent(&agent("a")).expect("entry");
    assert_eq!(entry.status(), AgentRunStatus::Completed);
    assert_eq!(entry.percentage(), 100);
}

#[rstest]
fn retrying_error_keeps_agent_running(harness: Harness) {
    let evaluation_id = seed(&harness);
    harness
        .aggregator
        .update_agent_progress(evaluation_id, &agent("b"), AgentRunStatus::Running, 30)
        .expect("update succeeds");

    let retrying = harness
        .aggregator
        .record_agent_error(evaluation_id, &agent("b"), "rate limited", false)
        .expect("update succeeds");
    let entry = retrying.agent(&agent("b")).expect("entry");
    assert_eq!(entry.status(), AgentRunStatus::Running);
    assert_eq!(entry.percentage(), 30);
    assert_eq!(entry.error(), Some("rate limited"));

    let failed = harness
        .aggregator
        .record_agent_error(evaluation_id, &agent("b"), "gave up", true)
        .expect("update succeeds");
    assert_eq!(failed.failed_agents(), vec![agent("b")]);
}

#[rstest]
fn unknown_ids_are_reported(harness: Harness) {
    let evaluation_id = seed(&harness);
    let stranger = EvaluationId::new();

    assert!(harness.aggregator.get_evaluation_progress(stranger).is_none());
    assert_eq!(
        harness
            .aggregator
            .update_agent_progress(stranger, &agent("a"), AgentRunStatus::Running, 1),
        Err(ProgressError::UnknownEvaluation(stranger))
    );
    assert_eq!(
        harness
            .aggregator
            .update_agent_progress(evaluation_id, &agent("z"), AgentRunStatus::Running, 1),
        Err(ProgressError::UnknownAgent {
            evaluation_id,
            agent_type: agent("z"),
        })
    );
}

#[rstest]
fn snapshots_are_copies(harness: Harness) {
    let evaluation_id = seed(&harness);
    let before = harness
        .aggregator
        .get_evaluation_progress(evaluation_id)
        .expect("snapshot");

    harness
        .aggregator
        .update_agent_progress(evaluation_id, &agent("c"), AgentRunStatus::Running, 90)
        .expect("update succeeds");

    assert_eq!(before.overall_progress(), 0);
    assert_eq!(
        harness
            .aggregator
            .get_evaluation_progress(evaluation_id)
            .map(|snapshot| snapshot.overall_progress()),
        Some(30)
    );
}

#[rstest]
#[tokio::test]
async fn watchers_observe_changes(harness: Harness) {
    let evaluation_id = seed(&harness);
    let mut receiver = harness.aggregator.watch(evaluation_id).expect("watchable");

    harness
        .aggregator
        .update_agent_progress(evaluation_id, &agent("a"), AgentRunStatus::Running, 60)
        .expect("update succeeds");

    receiver.changed().await.expect("sender alive");
    assert_eq!(receiver.borrow_and_update().overall_progress(), 20);
}

#[rstest]
fn terminal_evaluations_expire_after_retention(harness: Harness) {
    let finished = seed(&harness);
    let running = seed(&harness);
    harness
        .aggregator
        .complete_evaluation(finished)
        .expect("completion succeeds");

    harness.clock.advance(Duration::from_secs(30));
    assert_eq!(harness.aggregator.cleanup_expired(), 0);

    harness.clock.advance(Duration::from_secs(31));
    assert_eq!(harness.aggregator.cleanup_expired(), 1);
    assert!(!harness.aggregator.contains(finished));
    assert!(harness.aggregator.contains(running));
}

#[rstest]
fn failure_is_terminal(harness: Harness) {
    let evaluation_id = seed(&harness);

    let failed = harness
        .aggregator
        .fail_evaluation(evaluation_id, "no agent succeeded")
        .expect("failure succeeds");
    let after = harness
        .aggregator
        .complete_evaluation(evaluation_id)
        .expect("completion call succeeds");

    assert_eq!(failed.state(), EvaluationState::Failed);
    assert_eq!(after.state(), EvaluationState::Failed);
    assert_eq!(after.error(), Some("no agent succeeded"));
    assert!(after.finished_at().is_some());
}
