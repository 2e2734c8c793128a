//! Evaluation pipeline: planning, dependency-ordered dispatch, finalization.

use super::queue::{PipelineResult, QueueManager};
use crate::background::BackgroundTask;
use crate::bus::domain::MessagePayload;
use crate::bus::services::MessageBus;
use crate::ids::EvaluationId;
use crate::pipeline::domain::{
    EvaluationRun, Job, JobId, JobKind, JobPayload, JobStatus, QueueEvent,
};
use crate::pipeline::ports::{JobContext, JobError, JobHandler, JobHandlerResult, QueueBackend};
use crate::progress::domain::{AgentRunStatus, EvaluationProgress};
use crate::progress::services::ProgressAggregator;
use crate::scheduler::domain::AgentType;
use crate::scheduler::ports::{AgentContext, AgentRequest, ProgressReporter};
use crate::scheduler::services::AgentRegistry;
use async_trait::async_trait;
use mockable::Clock;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

struct EvaluationInner<B, C>
where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    queue: QueueManager<B, C>,
    registry: AgentRegistry<C>,
    aggregator: ProgressAggregator<C>,
    bus: MessageBus,
    runs: Mutex<HashMap<EvaluationId, EvaluationRun>>,
}

/// Turns submitted ideas into dependency-ordered agent jobs.
///
/// The evaluation-request handler plans the run and dispatches agents with
/// no pending dependencies. A coordinator task listens to queue events and
/// dispatches dependents as their dependencies complete; once every agent
/// is terminal it enqueues the result-processing job, which publishes the
/// evaluation outcome on the bus.
pub struct EvaluationPipeline<B, C>
where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    inner: Arc<EvaluationInner<B, C>>,
}

impl<B, C> Clone for EvaluationPipeline<B, C>
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

impl<B, C> EvaluationPipeline<B, C>
where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Wires the pipeline to its collaborators.
    #[must_use]
    pub fn new(
        queue: QueueManager<B, C>,
        registry: AgentRegistry<C>,
        aggregator: ProgressAggregator<C>,
        bus: MessageBus,
    ) -> Self {
        Self {
            inner: Arc::new(EvaluationInner {
                queue,
                registry,
                aggregator,
                bus,
                runs: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the underlying queue manager.
    #[must_use]
    pub fn queue(&self) -> &QueueManager<B, C> {
        &self.inner.queue
    }

    /// Registers the three queue handlers and starts the coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`super::PipelineError::HandlerAlreadyRegistered`] when
    /// called twice, or [`super::PipelineError::Closed`] after the queues
    /// closed.
    pub fn install(&self) -> PipelineResult<BackgroundTask> {
        let events = self.inner.queue.subscribe();
        for kind in JobKind::ALL {
            self.inner.queue.process(
                kind,
                Arc::new(StageHandler {
                    inner: Arc::clone(&self.inner),
                }),
            )?;
        }
        let inner = Arc::clone(&self.inner);
        Ok(BackgroundTask::spawn("evaluation-coordinator", move |token| {
            coordinate(inner, events, token)
        }))
    }

    /// Submits an idea for evaluation.
    ///
    /// An empty `agents` list evaluates with every registered agent.
    ///
    /// # Errors
    ///
    /// Returns a queue error when the request cannot be enqueued.
    #[tracing::instrument(skip(self, idea, parameters))]
    pub async fn submit(
        &self,
        idea: impl Into<String> + Send,
        agents: Vec<AgentType>,
        parameters: Value,
    ) -> PipelineResult<(EvaluationId, JobId)> {
        let evaluation_id = EvaluationId::new();
        let job_id = self
            .inner
            .queue
            .add(
                JobPayload::EvaluationRequest {
                    evaluation_id,
                    idea: idea.into(),
                    agents,
                    parameters,
                },
                None,
            )
            .await?;
        tracing::info!(%evaluation_id, %job_id, "evaluation submitted");
        Ok((evaluation_id, job_id))
    }

    /// Returns the progress snapshot of an evaluation.
    #[must_use]
    pub fn progress(&self, evaluation_id: EvaluationId) -> Option<EvaluationProgress> {
        self.inner.aggregator.get_evaluation_progress(evaluation_id)
    }

    /// Returns whether the evaluation is still being coordinated.
    #[must_use]
    pub fn is_active(&self, evaluation_id: EvaluationId) -> bool {
        self.inner.runs().contains_key(&evaluation_id)
    }

    /// Returns the number of evaluations being coordinated.
    #[must_use]
    pub fn active_evaluations(&self) -> usize {
        self.inner.runs().len()
    }

    /// Stops an evaluation: queued agent jobs are removed, running ones are
    /// signalled, and an evaluation error is published. Returns false when
    /// the evaluation is not active.
    ///
    /// # Errors
    ///
    /// Returns a queue error when a job cannot be cancelled.
    pub async fn cancel(&self, evaluation_id: EvaluationId) -> PipelineResult<bool> {
        let Some(run) = self.inner.runs().remove(&evaluation_id) else {
            return Ok(false);
        };
        for (agent_type, assigned) in run.in_flight() {
            if let Some(job_id) = assigned {
                let outcome = self.inner.queue.cancel(job_id).await?;
                tracing::debug!(%evaluation_id, %agent_type, ?outcome, "agent job cancelled");
            }
        }
        self.inner
            .publish(MessagePayload::EvaluationError {
                evaluation_id,
                error: "evaluation cancelled".to_owned(),
            })
            .await;
        tracing::info!(%evaluation_id, "evaluation cancelled");
        Ok(true)
    }
}

impl<B, C> fmt::Debug for EvaluationPipeline<B, C>
where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationPipeline")
            .field("active_evaluations", &self.active_evaluations())
            .finish_non_exhaustive()
    }
}

impl<B, C> EvaluationInner<B, C>
where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn runs(&self) -> MutexGuard<'_, HashMap<EvaluationId, EvaluationRun>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn publish(&self, payload: MessagePayload) {
        let message_type = payload.message_type();
        let message = self.bus.message(payload);
        if let Err(error) = self.bus.publish(message).await {
            tracing::warn!(%message_type, %error, "pipeline event not published");
        }
    }

    async fn plan(
        &self,
        evaluation_id: EvaluationId,
        idea: &str,
        agents: &[AgentType],
        parameters: &Value,
    ) -> JobHandlerResult {
        if self.runs().contains_key(&evaluation_id) {
            tracing::debug!(%evaluation_id, "evaluation already planned");
            return Ok(json!({ "status": "already-planned" }));
        }

        let requested: Vec<AgentType> = if agents.is_empty() {
            self.registry
                .list()
                .into_iter()
                .map(|descriptor| descriptor.agent_type().clone())
                .collect()
        } else {
            agents.to_vec()
        };
        let plan = match self.registry.plan_for(&requested) {
            Ok(plan) if !plan.is_empty() => plan,
            Ok(_) => {
                return self
                    .reject(evaluation_id, &requested, "no agents available".to_owned())
                    .await;
            }
            Err(error) => {
                return self
                    .reject(evaluation_id, &requested, error.to_string())
                    .await;
            }
        };

        let order = plan.order();
        let dependencies: BTreeMap<AgentType, BTreeSet<AgentType>> = order
            .iter()
            .map(|agent| {
                let deps = self
                    .registry
                    .node(agent)
                    .map(|node| node.dependencies().clone())
                    .unwrap_or_default();
                (agent.clone(), deps)
            })
            .collect();
        self.aggregator
            .initialize_evaluation(evaluation_id, order.iter().cloned());

        let ready = {
            let mut runs = self.runs();
            let run = runs.entry(evaluation_id).or_insert_with(|| {
                EvaluationRun::new(evaluation_id, idea, parameters.clone(), dependencies)
            });
            run.take_ready()
        };
        if let Err(error) = self.dispatch(evaluation_id, ready).await {
            self.runs().remove(&evaluation_id);
            return Err(JobError::new(format!("failed to dispatch agents: {error}")));
        }

        tracing::info!(
            %evaluation_id,
            agents = order.len(),
            levels = plan.levels().len(),
            "evaluation planned"
        );
        Ok(json!({ "agents": order, "levels": plan.levels().len() }))
    }

    async fn reject(
        &self,
        evaluation_id: EvaluationId,
        requested: &[AgentType],
        reason: String,
    ) -> JobHandlerResult {
        tracing::warn!(%evaluation_id, error = %reason, "evaluation rejected");
        self.aggregator
            .initialize_evaluation(evaluation_id, requested.iter().cloned());
        self.publish(MessagePayload::EvaluationError {
            evaluation_id,
            error: reason.clone(),
        })
        .await;
        Ok(json!({ "status": "rejected", "error": reason }))
    }

    async fn dispatch(
        &self,
        evaluation_id: EvaluationId,
        agents: Vec<AgentType>,
    ) -> PipelineResult<()> {
        for agent_type in agents {
            let Some((idea, parameters)) = self
                .runs()
                .get(&evaluation_id)
                .map(|run| (run.idea().to_owned(), run.parameters().clone()))
            else {
                return Ok(());
            };
            let job_id = self
                .queue
                .add(
                    JobPayload::AgentTask {
                        evaluation_id,
                        agent_type: agent_type.clone(),
                        idea,
                        parameters,
                    },
                    None,
                )
                .await?;
            if let Some(run) = self.runs().get_mut(&evaluation_id) {
                run.assign_job(&agent_type, job_id);
            }
            tracing::debug!(%evaluation_id, %agent_type, %job_id, "agent dispatched");
        }
        Ok(())
    }

    async fn run_agent(
        &self,
        job: &Job,
        context: &JobContext,
        evaluation_id: EvaluationId,
        agent_type: &AgentType,
        idea: &str,
        parameters: &Value,
    ) -> JobHandlerResult {
        let dependency_results = self
            .runs()
            .get(&evaluation_id)
            .map(|run| run.dependency_results(agent_type))
            .unwrap_or_default();
        self.publish(MessagePayload::AgentStart {
            evaluation_id,
            agent_type: agent_type.clone(),
        })
        .await;

        let agent_context = AgentContext::new()
            .with_attempt(context.attempt())
            .with_dependency_results(dependency_results)
            .with_progress(ProgressReporter::new(
                self.bus.clone(),
                evaluation_id,
                agent_type.clone(),
            ))
            .with_cancellation(context.cancellation().clone());
        let request = AgentRequest::new(evaluation_id, idea).with_parameters(parameters.clone());

        match self
            .registry
            .execute(agent_type, &request, &agent_context)
            .await
        {
            Ok(output) => {
                let result = output.into_data();
                self.publish(MessagePayload::AgentComplete {
                    evaluation_id,
                    agent_type: agent_type.clone(),
                    result: result.clone(),
                })
                .await;
                Ok(result)
            }
            Err(error) => {
                let terminal = context.is_cancelled()
                    || context.attempt().saturating_add(1) >= job.options().attempts;
                self.publish(MessagePayload::AgentError {
                    evaluation_id,
                    agent_type: agent_type.clone(),
                    error: error.to_string(),
                    terminal,
                })
                .await;
                Err(JobError::new(error.to_string()))
            }
        }
    }

    async fn finalize(&self, evaluation_id: EvaluationId) -> JobHandlerResult {
        let Some((results, failed_agents)) = self
            .runs()
            .get(&evaluation_id)
            .map(|run| (run.results().clone(), run.failed_agents()))
        else {
            tracing::debug!(%evaluation_id, "evaluation already finalized");
            return Ok(json!({ "status": "already-finalized" }));
        };

        let summary = json!({ "completed": results.len(), "failed": failed_agents });
        if results.is_empty() {
            self.publish(MessagePayload::EvaluationError {
                evaluation_id,
                error: "no agent produced a result".to_owned(),
            })
            .await;
        } else {
            self.publish(MessagePayload::EvaluationComplete {
                evaluation_id,
                results,
                failed_agents,
            })
            .await;
        }
        Ok(summary)
    }

    async fn on_event(&self, event: QueueEvent) {
        match event {
            QueueEvent::Completed {
                payload:
                    JobPayload::AgentTask {
                        evaluation_id,
                        agent_type,
                        ..
                    },
                result,
                ..
            } => self.on_agent_completed(evaluation_id, &agent_type, result).await,
            QueueEvent::Failed {
                payload:
                    JobPayload::AgentTask {
                        evaluation_id,
                        agent_type,
                        ..
                    },
                error,
                ..
            } => self.on_agent_failed(evaluation_id, &agent_type, error).await,
            QueueEvent::Completed {
                payload: JobPayload::ResultProcessing { evaluation_id },
                ..
            } => {
                if self.runs().remove(&evaluation_id).is_some() {
                    tracing::info!(%evaluation_id, "evaluation finished");
                }
            }
            QueueEvent::Failed { payload, error, .. } => {
                let evaluation_id = payload.evaluation_id();
                self.runs().remove(&evaluation_id);
                tracing::error!(%evaluation_id, kind = %payload.kind(), %error, "evaluation failed");
                self.publish(MessagePayload::EvaluationError {
                    evaluation_id,
                    error,
                })
                .await;
            }
            QueueEvent::Retrying {
                job_id,
                kind,
                attempts_made,
                ..
            } => tracing::debug!(%job_id, %kind, attempts_made, "job will be retried"),
            QueueEvent::Stalled { job_id, kind } => {
                tracing::debug!(%job_id, %kind, "job stalled");
            }
            QueueEvent::Completed { .. } => {}
        }
    }

    async fn on_agent_completed(
        &self,
        evaluation_id: EvaluationId,
        agent_type: &AgentType,
        result: Value,
    ) {
        let (ready, finished) = {
            let mut runs = self.runs();
            let Some(run) = runs.get_mut(&evaluation_id) else {
                return;
            };
            if !run.record_completion(agent_type, result) {
                return;
            }
            (run.take_ready(), run.begin_finalizing())
        };
        if let Err(error) = self.dispatch(evaluation_id, ready.clone()).await {
            tracing::error!(%evaluation_id, %error, "failed to dispatch dependents");
            for agent in ready {
                self.on_agent_failed(evaluation_id, &agent, format!("dispatch failed: {error}"))
                    .await;
            }
            return;
        }
        if finished {
            self.enqueue_results(evaluation_id).await;
        }
    }

    async fn on_agent_failed(
        &self,
        evaluation_id: EvaluationId,
        agent_type: &AgentType,
        error: String,
    ) {
        let (skipped, finished, skip_errors) = {
            let mut runs = self.runs();
            let Some(run) = runs.get_mut(&evaluation_id) else {
                return;
            };
            let newly_skipped = run.record_failure(agent_type, error.clone());
            let reasons: Vec<String> = newly_skipped
                .iter()
                .map(|agent| run.error(agent).unwrap_or_default().to_owned())
                .collect();
            (newly_skipped, run.begin_finalizing(), reasons)
        };

        let already_failed = self
            .aggregator
            .get_evaluation_progress(evaluation_id)
            .and_then(|progress| progress.agent(agent_type).map(|entry| entry.status()))
            == Some(AgentRunStatus::Failed);
        if !already_failed {
            self.publish(MessagePayload::AgentError {
                evaluation_id,
                agent_type: agent_type.clone(),
                error,
                terminal: true,
            })
            .await;
        }
        for (agent, reason) in skipped.into_iter().zip(skip_errors) {
            tracing::warn!(%evaluation_id, agent_type = %agent, "agent skipped");
            self.publish(MessagePayload::AgentError {
                evaluation_id,
                agent_type: agent,
                error: reason,
                terminal: true,
            })
            .await;
        }
        if finished {
            self.enqueue_results(evaluation_id).await;
        }
    }

    async fn enqueue_results(&self, evaluation_id: EvaluationId) {
        match self
            .queue
            .add(JobPayload::ResultProcessing { evaluation_id }, None)
            .await
        {
            Ok(job_id) => tracing::debug!(%evaluation_id, %job_id, "result processing enqueued"),
            Err(error) => {
                tracing::error!(%evaluation_id, %error, "failed to enqueue result processing");
                self.runs().remove(&evaluation_id);
                self.publish(MessagePayload::EvaluationError {
                    evaluation_id,
                    error: error.to_string(),
                })
                .await;
            }
        }
    }

    /// Replays terminal agent jobs whose events were missed.
    async fn resync(&self) {
        let in_flight: Vec<(EvaluationId, AgentType, JobId)> = self
            .runs()
            .values()
            .flat_map(|run| {
                let evaluation_id = run.evaluation_id();
                run.in_flight()
                    .into_iter()
                    .filter_map(move |(agent, job_id)| job_id.map(|id| (evaluation_id, agent, id)))
            })
            .collect();
        for (evaluation_id, agent_type, job_id) in in_flight {
            match self.queue.get_job(job_id).await {
                Ok(Some(job)) if job.status() == JobStatus::Completed => {
                    let result = job.result().cloned().unwrap_or(Value::Null);
                    self.on_agent_completed(evaluation_id, &agent_type, result).await;
                }
                Ok(Some(job)) if job.status() == JobStatus::Failed => {
                    let error = job.failed_reason().unwrap_or("agent failed").to_owned();
                    self.on_agent_failed(evaluation_id, &agent_type, error).await;
                }
                Ok(_) => {}
                Err(error) => tracing::warn!(%job_id, %error, "resync lookup failed"),
            }
        }
    }
}

struct StageHandler<B, C>
where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    inner: Arc<EvaluationInner<B, C>>,
}

#[async_trait]
impl<B, C> JobHandler for StageHandler<B, C>
where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    async fn handle(&self, job: &Job, context: JobContext) -> JobHandlerResult {
        match job.payload() {
            JobPayload::EvaluationRequest {
                evaluation_id,
                idea,
                agents,
                parameters,
            } => self.inner.plan(*evaluation_id, idea, agents, parameters).await,
            JobPayload::AgentTask {
                evaluation_id,
                agent_type,
                idea,
                parameters,
            } => {
                self.inner
                    .run_agent(job, &context, *evaluation_id, agent_type, idea, parameters)
                    .await
            }
            JobPayload::ResultProcessing { evaluation_id } => {
                self.inner.finalize(*evaluation_id).await
            }
        }
    }
}

async fn coordinate<B, C>(
    inner: Arc<EvaluationInner<B, C>>,
    mut events: broadcast::Receiver<QueueEvent>,
    token: tokio_util::sync::CancellationToken,
) where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    loop {
        let received = tokio::select! {
            biased;
            () = token.cancelled() => break,
            received = events.recv() => received,
        };
        match received {
            Ok(event) => inner.on_event(event).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "queue events lagged; resynchronising evaluations");
                inner.resync().await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::debug!("evaluation coordinator stopped");
}
