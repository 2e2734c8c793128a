//! Unit tests for the in-memory queue backend.

use crate::ids::EvaluationId;
use crate::pipeline::{
    adapters::InMemoryQueueBackend,
    domain::{Job, JobKind, JobOptions, JobPayload, JobStatus},
    ports::{QueueBackend, QueueBackendError},
};
use chrono::Utc;
use rstest::{fixture, rstest};
use serde_json::json;
use std::time::Duration;

const LEASE: Duration = Duration::from_secs(30);

#[fixture]
fn backend() -> InMemoryQueueBackend {
    InMemoryQueueBackend::new()
}

fn results_job(options: JobOptions) -> Job {
    Job::new(
        JobPayload::ResultProcessing {
            evaluation_id: EvaluationId::new(),
        },
        options,
        Utc::now(),
    )
}

#[rstest]
#[tokio::test]
async fn dequeue_orders_by_priority_then_insertion(backend: InMemoryQueueBackend) {
    let low = results_job(JobOptions::default().with_priority(5));
    let first_urgent = results_job(JobOptions::default().with_priority(1));
    let second_urgent = results_job(JobOptions::default().with_priority(1));
    let expected = [first_urgent.id(), second_urgent.id(), low.id()];
    for job in [low, first_urgent, second_urgent] {
        backend.enqueue(job).await.expect("enqueue succeeds");
    }

    let mut order = Vec::new();
    while let Some(lease) = backend
        .dequeue(JobKind::ResultProcessing, LEASE)
        .await
        .expect("dequeue succeeds")
    {
        assert_eq!(lease.job.status(), JobStatus::Active);
        order.push(lease.job.id());
    }

    assert_eq!(order, expected);
}

#[rstest]
#[tokio::test]
async fn dequeue_only_serves_requested_kind(backend: InMemoryQueueBackend) {
    backend
        .enqueue(results_job(JobOptions::default()))
        .await
        .expect("enqueue succeeds");

    let lease = backend
        .dequeue(JobKind::AgentTask, LEASE)
        .await
        .expect("dequeue succeeds");

    assert!(lease.is_none());
}

#[rstest]
#[tokio::test]
async fn enqueue_rejects_duplicate_ids(backend: InMemoryQueueBackend) {
    let job = results_job(JobOptions::default());
    backend.enqueue(job.clone()).await.expect("first enqueue");

    let result = backend.enqueue(job).await;

    assert!(matches!(result, Err(QueueBackendError::DuplicateJob(_))));
}

#[rstest]
#[tokio::test]
async fn delayed_jobs_wait_for_their_delay(backend: InMemoryQueueBackend) {
    let job = results_job(JobOptions::default().with_delay(Duration::from_millis(40)));
    assert_eq!(job.status(), JobStatus::Delayed);
    backend.enqueue(job).await.expect("enqueue succeeds");

    assert!(
        backend
            .dequeue(JobKind::ResultProcessing, LEASE)
            .await
            .expect("dequeue succeeds")
            .is_none()
    );
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(
        backend
            .dequeue(JobKind::ResultProcessing, LEASE)
            .await
            .expect("dequeue succeeds")
            .is_some()
    );
}

#[rstest]
#[tokio::test]
async fn nack_with_retry_requeues_and_counts_attempt(backend: InMemoryQueueBackend) {
    let job = results_job(JobOptions::default());
    let job_id = job.id();
    backend.enqueue(job).await.expect("enqueue succeeds");
    let lease = backend
        .dequeue(JobKind::ResultProcessing, LEASE)
        .await
        .expect("dequeue succeeds")
        .expect("job is ready");

    let updated = backend
        .nack(job_id, lease.token, "boom".to_owned(), Some(Duration::ZERO), false)
        .await
        .expect("nack succeeds");

    assert_eq!(updated.status(), JobStatus::Waiting);
    assert_eq!(updated.attempts_made(), 1);
    assert_eq!(updated.failed_reason(), Some("boom"));
}

#[rstest]
#[tokio::test]
async fn reclaimed_lease_rejects_late_ack(backend: InMemoryQueueBackend) {
    let job = results_job(JobOptions::default());
    let job_id = job.id();
    backend.enqueue(job).await.expect("enqueue succeeds");
    let lease = backend
        .dequeue(JobKind::ResultProcessing, Duration::from_millis(5))
        .await
        .expect("dequeue succeeds")
        .expect("job is ready");
    tokio::time::sleep(Duration::from_millis(20)).await;

    let reclaimed = backend
        .reclaim_expired(JobKind::ResultProcessing)
        .await
        .expect("reclaim succeeds");
    let late = backend.ack(job_id, lease.token, json!("late"), false).await;

    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed.first().map(Job::status), Some(JobStatus::Waiting));
    assert_eq!(reclaimed.first().map(Job::attempts_made), Some(1));
    assert!(matches!(late, Err(QueueBackendError::LeaseLost(id)) if id == job_id));
}

#[rstest]
#[tokio::test]
async fn active_jobs_cannot_be_removed(backend: InMemoryQueueBackend) {
    let job = results_job(JobOptions::default());
    let job_id = job.id();
    backend.enqueue(job).await.expect("enqueue succeeds");
    backend
        .dequeue(JobKind::ResultProcessing, LEASE)
        .await
        .expect("dequeue succeeds");

    let result = backend.remove(job_id).await;

    assert!(matches!(result, Err(QueueBackendError::JobActive(_))));
}

#[rstest]
#[tokio::test]
async fn ack_can_drop_completed_job(backend: InMemoryQueueBackend) {
    let job = results_job(JobOptions::default().removing_on_complete());
    let job_id = job.id();
    backend.enqueue(job).await.expect("enqueue succeeds");
    let lease = backend
        .dequeue(JobKind::ResultProcessing, LEASE)
        .await
        .expect("dequeue succeeds")
        .expect("job is ready");

    let completed = backend
        .ack(job_id, lease.token, json!({ "ok": true }), true)
        .await
        .expect("ack succeeds");

    assert_eq!(completed.status(), JobStatus::Completed);
    assert!(backend.find(job_id).await.expect("find succeeds").is_none());
    assert!(backend.is_empty().expect("state readable"));
}

#[rstest]
#[tokio::test]
async fn clean_removes_only_matching_terminal_jobs(backend: InMemoryQueueBackend) {
    let finished = results_job(JobOptions::default());
    let failing = results_job(JobOptions::default());
    let pending = results_job(JobOptions::default());
    let (finished_id, failing_id) = (finished.id(), failing.id());
    for job in [finished, failing] {
        backend.enqueue(job).await.expect("enqueue succeeds");
    }
    for _ in 0..2 {
        let lease = backend
            .dequeue(JobKind::ResultProcessing, LEASE)
            .await
            .expect("dequeue succeeds")
            .expect("job is ready");
        if lease.job.id() == finished_id {
            backend
                .ack(finished_id, lease.token, json!(null), false)
                .await
                .expect("ack succeeds");
        } else {
            backend
                .nack(failing_id, lease.token, "bad".to_owned(), None, false)
                .await
                .expect("nack succeeds");
        }
    }
    backend.enqueue(pending).await.expect("enqueue succeeds");

    let removed = backend
        .clean(JobKind::ResultProcessing, Duration::ZERO, 0, Some(JobStatus::Failed))
        .await
        .expect("clean succeeds");
    let counts = backend
        .counts(JobKind::ResultProcessing)
        .await
        .expect("counts readable");

    assert_eq!(removed, vec![failing_id]);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.failed, 0);
    assert_eq!(counts.waiting, 1);
}
