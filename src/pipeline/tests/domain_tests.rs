//! Unit tests for backoff policies and evaluation run bookkeeping.

use crate::ids::EvaluationId;
use crate::pipeline::domain::{
    AgentPhase, BackoffPolicy, EvaluationRun, JobCounts, JobKind, JobStatus, PipelineConfig,
};
use crate::scheduler::domain::AgentType;
use rstest::{fixture, rstest};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

fn agent(name: &str) -> AgentType {
    AgentType::new(name).expect("valid agent type")
}

#[fixture]
fn diamond() -> EvaluationRun {
    let deps = |names: &[&str]| names.iter().map(|name| agent(name)).collect::<BTreeSet<_>>();
    let dependencies = BTreeMap::from([
        (agent("market"), deps(&[])),
        (agent("competitors"), deps(&["market"])),
        (agent("customers"), deps(&["market"])),
        (agent("financials"), deps(&["competitors", "customers"])),
    ]);
    EvaluationRun::new(EvaluationId::new(), "a bakery", json!({}), dependencies)
}

#[rstest]
#[case(1, 100)]
#[case(2, 200)]
#[case(3, 400)]
#[case(6, 2_000)]
fn exponential_backoff_doubles_up_to_cap(#[case] retry: u32, #[case] expected_ms: u64) {
    let policy = BackoffPolicy::exponential(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(2));

    assert_eq!(policy.delay_for(retry), Duration::from_millis(expected_ms));
}

#[rstest]
fn fixed_backoff_never_grows() {
    let policy = BackoffPolicy::fixed(Duration::from_millis(250));

    assert_eq!(policy.delay_for(1), policy.delay_for(7));
}

#[rstest]
fn jitter_stays_within_bound() {
    let policy = BackoffPolicy::fixed(Duration::from_millis(100)).with_jitter(Duration::from_millis(50));

    for _ in 0..50 {
        let delay = policy.delay_for(1);
        assert!(delay >= Duration::from_millis(100));
        assert!(delay <= Duration::from_millis(150));
    }
}

#[rstest]
fn backoff_deserializes_with_type_tag() {
    let policy: BackoffPolicy =
        serde_json::from_value(json!({ "type": "fixed", "delay_ms": 500 })).expect("valid policy");

    assert_eq!(policy.base_delay(3), Duration::from_millis(500));
}

#[rstest]
fn job_kind_parses_both_spellings() {
    assert_eq!(JobKind::try_from("agent_task"), Ok(JobKind::AgentTask));
    assert_eq!(
        JobKind::try_from("Result-Processing"),
        Ok(JobKind::ResultProcessing)
    );
    assert!(JobKind::try_from("nightly").is_err());
}

#[rstest]
fn paused_counts_move_waiting_jobs() {
    let mut counts = JobCounts::default();
    counts.record(JobStatus::Waiting);
    counts.record(JobStatus::Waiting);
    counts.record(JobStatus::Delayed);

    let paused = counts.as_paused();

    assert_eq!(paused.waiting, 0);
    assert_eq!(paused.paused, 2);
    assert_eq!(paused.backlog(), 3);
}

#[rstest]
fn default_config_tunes_each_queue() {
    let config = PipelineConfig::default();

    assert_eq!(config.settings(JobKind::AgentTask).concurrency, 10);
    assert_eq!(
        config.settings(JobKind::ResultProcessing).default_options.attempts,
        5
    );
    assert_eq!(config.event_capacity, 1024);
}

#[rstest]
fn run_releases_agents_level_by_level(mut diamond: EvaluationRun) {
    assert_eq!(diamond.take_ready(), vec![agent("market")]);
    assert!(diamond.take_ready().is_empty());

    assert!(diamond.record_completion(&agent("market"), json!({ "size": 10 })));
    assert_eq!(
        diamond.take_ready(),
        vec![agent("competitors"), agent("customers")]
    );

    assert!(diamond.record_completion(&agent("competitors"), json!(1)));
    assert!(diamond.take_ready().is_empty());
    assert!(diamond.record_completion(&agent("customers"), json!(2)));
    assert_eq!(diamond.take_ready(), vec![agent("financials")]);

    let inputs = diamond.dependency_results(&agent("financials"));
    assert_eq!(inputs.len(), 2);
    assert_eq!(inputs.get(&agent("customers")), Some(&json!(2)));
}

#[rstest]
fn failure_skips_transitive_dependents(mut diamond: EvaluationRun) {
    diamond.take_ready();
    diamond.record_completion(&agent("market"), json!({}));
    diamond.take_ready();

    let skipped = diamond.record_failure(&agent("competitors"), "quota exceeded");

    assert_eq!(skipped, vec![agent("financials")]);
    assert_eq!(diamond.phase(&agent("financials")), Some(AgentPhase::Skipped));
    assert_eq!(
        diamond.error(&agent("financials")),
        Some("skipped: dependency competitors failed")
    );
    assert!(!diamond.is_finished());

    diamond.record_completion(&agent("customers"), json!({}));
    assert!(diamond.is_finished());
    assert_eq!(
        diamond.failed_agents(),
        vec![agent("competitors"), agent("financials")]
    );
}

#[rstest]
fn finalizing_happens_once(mut diamond: EvaluationRun) {
    assert!(!diamond.begin_finalizing());
    for name in ["market", "competitors", "customers", "financials"] {
        diamond.take_ready();
        diamond.record_completion(&agent(name), json!(name));
    }

    assert!(diamond.begin_finalizing());
    assert!(!diamond.begin_finalizing());
}

#[rstest]
fn terminal_agents_ignore_repeat_outcomes(mut diamond: EvaluationRun) {
    diamond.take_ready();
    assert!(diamond.record_completion(&agent("market"), json!("first")));

    assert!(!diamond.record_completion(&agent("market"), json!("second")));
    assert!(diamond.record_failure(&agent("market"), "late").is_empty());
    assert_eq!(diamond.results().get(&agent("market")), Some(&json!("first")));
}

#[rstest]
fn dependencies_outside_the_run_are_ignored() {
    let dependencies = BTreeMap::from([(
        agent("summary"),
        BTreeSet::from([agent("unrelated")]),
    )]);
    let mut run = EvaluationRun::new(EvaluationId::new(), "idea", json!(null), dependencies);

    assert_eq!(run.take_ready(), vec![agent("summary")]);
}
