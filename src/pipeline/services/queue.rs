//! Queue manager: workers, retries, stall detection.

use crate::background::BackgroundTask;
use crate::pipeline::domain::{
    Job, JobCounts, JobId, JobKind, JobOptions, JobPayload, JobStatus, PipelineConfig,
    QueueEvent, QueueSettings,
};
use crate::pipeline::ports::{
    JobContext, JobError, JobHandler, Lease, LeaseToken, QueueBackend, QueueBackendError,
};
use mockable::Clock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Errors returned by the queue manager.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Backend failure.
    #[error(transparent)]
    Backend(#[from] QueueBackendError),

    /// `process` was called twice for the same queue.
    #[error("a handler is already registered for the {0} queue")]
    HandlerAlreadyRegistered(JobKind),

    /// No job with the identifier exists.
    #[error("job {0} not found")]
    JobNotFound(JobId),

    /// The job failed on its last allowed attempt.
    #[error("job {job_id} failed after {attempts} attempts: {error}")]
    RetryExhausted {
        /// Failed job.
        job_id: JobId,
        /// Attempts consumed.
        attempts: u32,
        /// Last error.
        error: String,
    },

    /// `clean` was asked for a status that is not terminal.
    #[error("only completed or failed jobs can be cleaned, not {0}")]
    NonTerminalClean(JobStatus),

    /// The queues were closed.
    #[error("job queues are closed")]
    Closed,
}

/// Result type for queue manager operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// What [`QueueManager::cancel`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job had not started and was removed.
    Removed,
    /// The job is running; its handler was asked to stop.
    Signalled,
    /// The job already finished.
    Finished,
    /// No such job.
    NotFound,
}

struct QueueRuntime {
    settings: QueueSettings,
    handler: RwLock<Option<Arc<dyn JobHandler>>>,
    paused: AtomicBool,
    wake: Notify,
    slots: Arc<Semaphore>,
}

impl QueueRuntime {
    fn new(settings: QueueSettings) -> Self {
        Self {
            settings,
            handler: RwLock::new(None),
            paused: AtomicBool::new(false),
            wake: Notify::new(),
            slots: Arc::new(Semaphore::new(settings.concurrency.max(1))),
        }
    }

    fn handler(&self) -> Option<Arc<dyn JobHandler>> {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

struct ManagerInner<B, C> {
    config: PipelineConfig,
    backend: Arc<B>,
    clock: Arc<C>,
    evaluation: QueueRuntime,
    agent: QueueRuntime,
    results: QueueRuntime,
    events: broadcast::Sender<QueueEvent>,
    running: Mutex<HashMap<JobId, CancellationToken>>,
    cancelled: Mutex<HashSet<JobId>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<BackgroundTask>>,
    closed: AtomicBool,
}

/// Owner of the three logical job queues.
///
/// Each queue gets one handler through [`QueueManager::process`], which
/// also starts its worker and stall detector. A worker leases ready jobs
/// up to the queue's concurrency limit and settles each attempt with the
/// backend: success acks the job, failure either reschedules it after the
/// backoff delay or fails it terminally once its attempts are spent.
pub struct QueueManager<B, C>
where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    inner: Arc<ManagerInner<B, C>>,
}

impl<B, C> Clone for QueueManager<B, C>
where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B, C> QueueManager<B, C>
where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a manager over `backend`. No worker runs until a handler is
    /// registered.
    #[must_use]
    pub fn new(config: PipelineConfig, backend: Arc<B>, clock: Arc<C>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(ManagerInner {
                evaluation: QueueRuntime::new(config.evaluation),
                agent: QueueRuntime::new(config.agent),
                results: QueueRuntime::new(config.results),
                config,
                backend,
                clock,
                events,
                running: Mutex::new(HashMap::new()),
                cancelled: Mutex::new(HashSet::new()),
                shutdown: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.inner.backend
    }

    /// Subscribes to queue events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Enqueues `payload` on the queue matching its kind.
    ///
    /// `options` defaults to the queue's configured options.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Closed`] after [`QueueManager::close`], or
    /// a backend error.
    #[tracing::instrument(skip(self, payload, options), fields(kind = %payload.kind()))]
    pub async fn add(
        &self,
        payload: JobPayload,
        options: Option<JobOptions>,
    ) -> PipelineResult<JobId> {
        if self.is_closed() {
            return Err(PipelineError::Closed);
        }
        let kind = payload.kind();
        let queue = self.inner.queue(kind);
        let job = Job::new(
            payload,
            options.unwrap_or(queue.settings.default_options),
            self.inner.clock.utc(),
        );
        let job_id = job.id();
        let status = job.status();
        self.inner.backend.enqueue(job).await?;
        queue.wake.notify_one();
        tracing::debug!(%job_id, %status, "job enqueued");
        Ok(job_id)
    }

    /// Registers the single handler of `kind`'s queue and starts its worker
    /// and stall detector.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::HandlerAlreadyRegistered`] on a second call
    /// for the same queue or [`PipelineError::Closed`] after close.
    pub fn process(&self, kind: JobKind, handler: Arc<dyn JobHandler>) -> PipelineResult<()> {
        if self.is_closed() {
            return Err(PipelineError::Closed);
        }
        let queue = self.inner.queue(kind);
        {
            let mut slot = queue
                .handler
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                return Err(PipelineError::HandlerAlreadyRegistered(kind));
            }
            *slot = Some(handler);
        }

        let worker_inner = Arc::clone(&self.inner);
        let worker = BackgroundTask::spawn(format!("{kind}-worker"), move |token| {
            run_worker(worker_inner, kind, token)
        });
        let stall_inner = Arc::clone(&self.inner);
        let stall = BackgroundTask::every(
            format!("{kind}-stall-detector"),
            queue.settings.stall_check_interval(),
            move || {
                let inner = Arc::clone(&stall_inner);
                async move {
                    if let Err(error) = inner.reclaim_stalled(kind).await {
                        tracing::warn!(queue = %kind, %error, "stall check failed");
                    }
                }
            },
        );
        lock(&self.inner.tasks).extend([worker, stall]);
        tracing::info!(
            queue = %kind,
            concurrency = queue.settings.concurrency,
            "queue worker started"
        );
        Ok(())
    }

    /// Stops dequeuing from `kind`'s queue. Running jobs finish normally
    /// and queued jobs are kept.
    pub fn pause(&self, kind: JobKind) {
        if !self.inner.queue(kind).paused.swap(true, Ordering::AcqRel) {
            tracing::info!(queue = %kind, "queue paused");
        }
    }

    /// Restarts dequeuing from `kind`'s queue.
    pub fn resume(&self, kind: JobKind) {
        let queue = self.inner.queue(kind);
        if queue.paused.swap(false, Ordering::AcqRel) {
            queue.wake.notify_waiters();
            tracing::info!(queue = %kind, "queue resumed");
        }
    }

    /// Returns whether `kind`'s queue is paused.
    #[must_use]
    pub fn is_paused(&self, kind: JobKind) -> bool {
        self.inner.queue(kind).is_paused()
    }

    /// Returns the job counts of `kind`'s queue. Ready jobs of a paused
    /// queue are reported as paused.
    ///
    /// # Errors
    ///
    /// Returns a backend error when counts cannot be read.
    pub async fn counts(&self, kind: JobKind) -> PipelineResult<JobCounts> {
        let counts = self.inner.backend.counts(kind).await?;
        Ok(if self.is_paused(kind) {
            counts.as_paused()
        } else {
            counts
        })
    }

    /// Returns the job counts of every queue.
    ///
    /// # Errors
    ///
    /// Returns a backend error when counts cannot be read.
    pub async fn get_metrics(&self) -> PipelineResult<BTreeMap<JobKind, JobCounts>> {
        let mut metrics = BTreeMap::new();
        for kind in JobKind::ALL {
            metrics.insert(kind, self.counts(kind).await?);
        }
        Ok(metrics)
    }

    /// Removes up to `limit` terminal jobs of `kind` older than `max_age`
    /// (`limit == 0` removes all of them).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NonTerminalClean`] when `status` is not
    /// completed or failed, or a backend error.
    pub async fn clean(
        &self,
        kind: JobKind,
        max_age: Duration,
        limit: usize,
        status: Option<JobStatus>,
    ) -> PipelineResult<Vec<JobId>> {
        if let Some(wanted) = status
            && !wanted.is_terminal()
        {
            return Err(PipelineError::NonTerminalClean(wanted));
        }
        let removed = self
            .inner
            .backend
            .clean(kind, max_age, limit, status)
            .await?;
        if !removed.is_empty() {
            tracing::info!(queue = %kind, removed = removed.len(), "old jobs cleaned");
        }
        Ok(removed)
    }

    /// Reclaims finished jobs older than their queue's retention.
    ///
    /// # Errors
    ///
    /// Returns a backend error; queues cleaned before it stay cleaned.
    pub async fn clean_expired(&self) -> PipelineResult<usize> {
        let mut removed = 0;
        for kind in JobKind::ALL {
            let retention = self.inner.config.settings(kind).retention();
            removed += self.clean(kind, retention, 0, None).await?.len();
        }
        Ok(removed)
    }

    /// Starts the periodic retention sweep over every queue.
    #[must_use]
    pub fn start_cleanup(&self) -> BackgroundTask {
        let manager = self.clone();
        BackgroundTask::every(
            "job-retention",
            self.inner.config.clean_interval(),
            move || {
                let sweeper = manager.clone();
                async move {
                    if let Err(err) = sweeper.clean_expired().await {
                        tracing::warn!(error = %err, "job retention sweep failed");
                    }
                }
            },
        )
    }

    /// Looks a job up.
    ///
    /// # Errors
    ///
    /// Returns a backend error when the job cannot be read.
    pub async fn get_job(&self, job_id: JobId) -> PipelineResult<Option<Job>> {
        Ok(self.inner.backend.find(job_id).await?)
    }

    /// Cancels a job.
    ///
    /// A job that has not started is removed without running. A running
    /// job has its cancellation token triggered and fails without further
    /// retries once its handler returns.
    ///
    /// # Errors
    ///
    /// Returns a backend error when the job cannot be read or removed.
    pub async fn cancel(&self, job_id: JobId) -> PipelineResult<CancelOutcome> {
        if self.inner.signal_cancel(job_id) {
            return Ok(CancelOutcome::Signalled);
        }
        let Some(job) = self.inner.backend.find(job_id).await? else {
            return Ok(CancelOutcome::NotFound);
        };
        if job.status().is_terminal() {
            return Ok(CancelOutcome::Finished);
        }
        match self.inner.backend.remove(job_id).await {
            Ok(Some(_)) => {
                tracing::info!(%job_id, "queued job cancelled");
                Ok(CancelOutcome::Removed)
            }
            Ok(None) => Ok(CancelOutcome::NotFound),
            Err(QueueBackendError::JobActive(_)) if self.inner.signal_cancel(job_id) => {
                Ok(CancelOutcome::Signalled)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Waits until the job completes or fails terminally.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::RetryExhausted`] when the job failed,
    /// [`PipelineError::JobNotFound`] when it does not exist (including a
    /// job already removed on completion), or a backend error.
    pub async fn wait_for(&self, job_id: JobId) -> PipelineResult<Value> {
        let mut events = self.subscribe();
        loop {
            let job = self
                .get_job(job_id)
                .await?
                .ok_or(PipelineError::JobNotFound(job_id))?;
            match job.status() {
                JobStatus::Completed => return Ok(job.result().cloned().unwrap_or(Value::Null)),
                JobStatus::Failed => {
                    return Err(PipelineError::RetryExhausted {
                        job_id,
                        attempts: job.attempts_made(),
                        error: job.failed_reason().unwrap_or_default().to_owned(),
                    });
                }
                JobStatus::Waiting | JobStatus::Active | JobStatus::Delayed => {}
            }

            loop {
                match events.recv().await {
                    Ok(QueueEvent::Completed {
                        job_id: finished,
                        result,
                        ..
                    }) if finished == job_id => return Ok(result),
                    Ok(QueueEvent::Failed {
                        job_id: failed,
                        error,
                        attempts_made,
                        ..
                    }) if failed == job_id => {
                        return Err(PipelineError::RetryExhausted {
                            job_id,
                            attempts: attempts_made,
                            error,
                        });
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(%job_id, skipped, "queue events lagged; rechecking job");
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(PipelineError::Closed),
                }
            }
        }
    }

    /// Reclaims jobs of `kind` whose lease expired, returning how many
    /// were reclaimed. Runs periodically once the queue has a handler.
    ///
    /// # Errors
    ///
    /// Returns a backend error when leases cannot be scanned.
    pub async fn reclaim_stalled(&self, kind: JobKind) -> PipelineResult<usize> {
        self.inner.reclaim_stalled(kind).await
    }

    /// Returns whether [`QueueManager::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Stops every worker and stall detector.
    ///
    /// Running handlers see their cancellation token fire; close returns
    /// once they have settled. Queued jobs stay in the backend.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.shutdown.cancel();
        for queue in self.inner.queues() {
            queue.wake.notify_waiters();
        }
        let tasks: Vec<BackgroundTask> = lock(&self.inner.tasks).drain(..).collect();
        for task in tasks {
            task.stop().await;
        }
        tracing::info!("job queues closed");
    }
}

impl<B, C> fmt::Debug for QueueManager<B, C>
where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueManager")
            .field("config", &self.inner.config)
            .field("running", &lock(&self.inner.running).len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<B, C> ManagerInner<B, C>
where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    const fn queue(&self, kind: JobKind) -> &QueueRuntime {
        match kind {
            JobKind::EvaluationRequest => &self.evaluation,
            JobKind::AgentTask => &self.agent,
            JobKind::ResultProcessing => &self.results,
        }
    }

    const fn queues(&self) -> [&QueueRuntime; 3] {
        [&self.evaluation, &self.agent, &self.results]
    }

    fn emit(&self, event: QueueEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("queue event dropped: no subscribers");
        }
    }

    fn track(&self, job_id: JobId, token: CancellationToken) {
        lock(&self.running).insert(job_id, token);
    }

    /// Stops tracking a finished attempt, returning whether it was
    /// cancelled by a caller.
    fn untrack(&self, job_id: JobId) -> bool {
        lock(&self.running).remove(&job_id);
        lock(&self.cancelled).remove(&job_id)
    }

    fn signal_cancel(&self, job_id: JobId) -> bool {
        let Some(token) = lock(&self.running).get(&job_id).cloned() else {
            return false;
        };
        lock(&self.cancelled).insert(job_id);
        token.cancel();
        tracing::info!(%job_id, "running job signalled to cancel");
        true
    }

    async fn reclaim_stalled(&self, kind: JobKind) -> PipelineResult<usize> {
        let reclaimed = self.backend.reclaim_expired(kind).await?;
        for job in &reclaimed {
            let job_id = job.id();
            tracing::warn!(
                %job_id,
                queue = %kind,
                attempts_made = job.attempts_made(),
                "job stalled; lease reclaimed"
            );
            if let Some(token) = lock(&self.running).get(&job_id) {
                token.cancel();
            }
            self.emit(QueueEvent::Stalled { job_id, kind });
            if job.status() == JobStatus::Failed {
                self.emit(QueueEvent::Failed {
                    job_id,
                    payload: job.payload().clone(),
                    error: job.failed_reason().unwrap_or_default().to_owned(),
                    attempts_made: job.attempts_made(),
                });
            } else {
                self.queue(kind).wake.notify_one();
            }
        }
        Ok(reclaimed.len())
    }

    fn start_heartbeat(
        &self,
        kind: JobKind,
        job_id: JobId,
        token: LeaseToken,
        job_token: CancellationToken,
    ) -> BackgroundTask {
        let settings = self.queue(kind).settings;
        let backend = Arc::clone(&self.backend);
        let lease = settings.lease();
        BackgroundTask::every("lease-heartbeat", settings.heartbeat(), move || {
            let renewing = Arc::clone(&backend);
            let lost = job_token.clone();
            async move {
                match renewing.extend_lease(job_id, token, lease).await {
                    Ok(()) => {}
                    Err(QueueBackendError::LeaseLost(_) | QueueBackendError::NotFound(_)) => {
                        tracing::warn!(%job_id, "lease lost while running; stopping attempt");
                        lost.cancel();
                    }
                    Err(error) => tracing::warn!(%job_id, %error, "lease renewal failed"),
                }
            }
        })
    }

    async fn settle_success(&self, job: &Job, token: LeaseToken, result: Value) {
        let job_id = job.id();
        match self
            .backend
            .ack(job_id, token, result.clone(), job.options().remove_on_complete)
            .await
        {
            Ok(_) => {
                tracing::debug!(%job_id, queue = %job.kind(), "job completed");
                self.emit(QueueEvent::Completed {
                    job_id,
                    payload: job.payload().clone(),
                    result,
                });
            }
            Err(QueueBackendError::LeaseLost(_)) => {
                tracing::warn!(%job_id, "job finished after its lease was reclaimed; result discarded");
            }
            Err(error) => tracing::error!(%job_id, %error, "failed to record job completion"),
        }
    }

    async fn settle_failure(&self, job: &Job, token: LeaseToken, error: JobError, cancelled: bool) {
        let job_id = job.id();
        let kind = job.kind();
        let options = job.options();
        let failures = job.attempts_made().saturating_add(1);
        let retry_after = (!cancelled && failures < options.attempts)
            .then(|| options.backoff.delay_for(failures));
        let remove = retry_after.is_none() && options.remove_on_fail;
        let message = error.0;

        match self
            .backend
            .nack(job_id, token, message.clone(), retry_after, remove)
            .await
        {
            Ok(updated) => {
                if let Some(delay) = retry_after {
                    tracing::warn!(
                        %job_id,
                        queue = %kind,
                        attempts_made = updated.attempts_made(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %message,
                        "job attempt failed; retry scheduled"
                    );
                    self.emit(QueueEvent::Retrying {
                        job_id,
                        kind,
                        attempts_made: updated.attempts_made(),
                        delay,
                        error: message,
                    });
                    self.queue(kind).wake.notify_one();
                } else {
                    tracing::error!(
                        %job_id,
                        queue = %kind,
                        attempts_made = updated.attempts_made(),
                        cancelled,
                        error = %message,
                        "job failed"
                    );
                    self.emit(QueueEvent::Failed {
                        job_id,
                        payload: job.payload().clone(),
                        error: message,
                        attempts_made: updated.attempts_made(),
                    });
                }
            }
            Err(QueueBackendError::LeaseLost(_)) => {
                tracing::warn!(%job_id, "job failed after its lease was reclaimed");
            }
            Err(backend_error) => {
                tracing::error!(%job_id, error = %backend_error, "failed to record job failure");
            }
        }
    }
}

async fn run_worker<B, C>(inner: Arc<ManagerInner<B, C>>, kind: JobKind, token: CancellationToken)
where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    let queue = inner.queue(kind);
    let settings = queue.settings;
    let mut running = JoinSet::new();

    loop {
        while let Some(joined) = running.try_join_next() {
            log_join_error(kind, joined);
        }
        if queue.is_paused() {
            tokio::select! {
                () = token.cancelled() => break,
                () = queue.wake.notified() => continue,
                () = time::sleep(settings.poll_interval()) => continue,
            }
        }

        let permit = tokio::select! {
            () = token.cancelled() => break,
            acquired = Arc::clone(&queue.slots).acquire_owned() => match acquired {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        match inner.backend.dequeue(kind, settings.lease()).await {
            Ok(Some(lease)) => {
                running.spawn(execute(Arc::clone(&inner), kind, lease, permit));
                continue;
            }
            Ok(None) => drop(permit),
            Err(error) => {
                drop(permit);
                tracing::warn!(queue = %kind, %error, "dequeue failed");
            }
        }

        tokio::select! {
            () = token.cancelled() => break,
            () = queue.wake.notified() => {}
            () = time::sleep(settings.poll_interval()) => {}
        }
    }

    while let Some(joined) = running.join_next().await {
        log_join_error(kind, joined);
    }
    tracing::debug!(queue = %kind, "queue worker stopped");
}

async fn execute<B, C>(
    inner: Arc<ManagerInner<B, C>>,
    kind: JobKind,
    lease: Lease,
    _permit: OwnedSemaphorePermit,
) where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    let Lease { job, token } = lease;
    let job_id = job.id();

    if job.kind() != kind {
        let error = JobError::new(format!("job of kind {} delivered to the {kind} queue", job.kind()));
        inner.settle_failure(&job, token, error, true).await;
        return;
    }
    let Some(handler) = inner.queue(kind).handler() else {
        inner
            .settle_failure(&job, token, JobError::new("no handler registered"), false)
            .await;
        return;
    };

    let job_token = inner.shutdown.child_token();
    inner.track(job_id, job_token.clone());
    let heartbeat = inner.start_heartbeat(kind, job_id, token, job_token.clone());
    let context = JobContext::new(job.attempts_made(), job_token);
    let attempt = job.clone();
    tracing::debug!(%job_id, queue = %kind, attempt = job.attempts_made(), "job started");

    let outcome = match tokio::spawn(async move { handler.handle(&attempt, context).await }).await {
        Ok(outcome) => outcome,
        Err(join_error) => Err(JobError::new(format!("job handler panicked: {join_error}"))),
    };
    heartbeat.stop().await;
    let cancelled = inner.untrack(job_id);

    match outcome {
        Ok(result) => inner.settle_success(&job, token, result).await,
        Err(error) => inner.settle_failure(&job, token, error, cancelled).await,
    }
}

fn log_join_error(kind: JobKind, joined: Result<(), tokio::task::JoinError>) {
    if let Err(error) = joined {
        tracing::error!(queue = %kind, %error, "job task ended abnormally");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
