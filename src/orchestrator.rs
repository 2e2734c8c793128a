//! Composition root.
//!
//! [`Orchestrator`] builds every component exactly once from an
//! [`OrchestratorConfig`] and wires them together by explicit reference.
//! Nothing here is a process-wide singleton; tests build as many
//! orchestrators as they need.

use crate::background::BackgroundTask;
use crate::bus::domain::BusHealth;
use crate::bus::services::{MessageBus, Subscription};
use crate::config::OrchestratorConfig;
use crate::ids::EvaluationId;
use crate::limiter::domain::LimiterMetrics;
use crate::limiter::services::ConnectionLimiter;
use crate::pipeline::domain::{JobCounts, JobId, JobKind};
use crate::pipeline::ports::QueueBackend;
use crate::pipeline::services::{EvaluationPipeline, PipelineError, QueueManager};
use crate::progress::services::{ProgressAggregator, ProgressEventHandler};
use crate::scheduler::domain::AgentType;
use crate::scheduler::services::AgentRegistry;
use mockable::Clock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors raised by the orchestrator lifecycle.
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    /// A pipeline operation failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The orchestrator was shut down and cannot be restarted.
    #[error("orchestrator has been shut down")]
    ShutDown,
}

/// Result type for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Point-in-time view across every component.
#[derive(Debug, Clone)]
pub struct OrchestratorStatus {
    /// Message bus health.
    pub bus: BusHealth,
    /// Job counts per queue.
    pub queues: BTreeMap<JobKind, JobCounts>,
    /// Registered agents.
    pub registered_agents: usize,
    /// Evaluations still being coordinated.
    pub active_evaluations: usize,
    /// Connection limiter counters.
    pub limiter: LimiterMetrics,
}

enum Lifecycle {
    Idle,
    Running {
        tasks: Vec<BackgroundTask>,
        subscriptions: Vec<Subscription>,
    },
    Stopped,
}

/// Owns and wires the orchestration components.
pub struct Orchestrator<B, C>
where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    config: OrchestratorConfig,
    bus: MessageBus,
    registry: AgentRegistry<C>,
    aggregator: ProgressAggregator<C>,
    queue: QueueManager<B, C>,
    pipeline: EvaluationPipeline<B, C>,
    limiter: ConnectionLimiter<C>,
    lifecycle: Mutex<Lifecycle>,
}

impl<B, C> Orchestrator<B, C>
where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Builds every component from `config`.
    ///
    /// Nothing runs until [`Orchestrator::start`] is called.
    #[must_use]
    pub fn new(config: OrchestratorConfig, backend: Arc<B>, clock: Arc<C>) -> Self {
        let bus_clock: Arc<dyn Clock + Send + Sync> = Arc::<C>::clone(&clock);
        let bus = MessageBus::with_clock(config.bus.clone(), bus_clock);
        let registry =
            AgentRegistry::new(config.registry.clone(), bus.clone(), Arc::clone(&clock));
        let aggregator = ProgressAggregator::new(config.progress.clone(), Arc::clone(&clock));
        let queue = QueueManager::new(config.pipeline, backend, Arc::clone(&clock));
        let pipeline = EvaluationPipeline::new(
            queue.clone(),
            registry.clone(),
            aggregator.clone(),
            bus.clone(),
        );
        let limiter = ConnectionLimiter::new(config.limiter.clone(), clock);
        Self {
            config,
            bus,
            registry,
            aggregator,
            queue,
            pipeline,
            limiter,
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Returns the configuration the components were built from.
    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Returns the message bus.
    #[must_use]
    pub const fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Returns the agent registry.
    #[must_use]
    pub const fn registry(&self) -> &AgentRegistry<C> {
        &self.registry
    }

    /// Returns the progress aggregator.
    #[must_use]
    pub const fn aggregator(&self) -> &ProgressAggregator<C> {
        &self.aggregator
    }

    /// Returns the job queue manager.
    #[must_use]
    pub const fn queue(&self) -> &QueueManager<B, C> {
        &self.queue
    }

    /// Returns the evaluation pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &EvaluationPipeline<B, C> {
        &self.pipeline
    }

    /// Returns the connection limiter.
    #[must_use]
    pub const fn limiter(&self) -> &ConnectionLimiter<C> {
        &self.limiter
    }

    /// Starts queue workers, the coordinator and the periodic sweeps.
    ///
    /// Starting a running orchestrator is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::ShutDown`] after
    /// [`Orchestrator::shutdown`], or a pipeline error when the queue
    /// handlers cannot be installed.
    pub fn start(&self) -> OrchestratorResult<()> {
        let mut lifecycle = self.lifecycle();
        match *lifecycle {
            Lifecycle::Running { .. } => return Ok(()),
            Lifecycle::Stopped => return Err(OrchestratorError::ShutDown),
            Lifecycle::Idle => {}
        }

        let subscriptions = ProgressEventHandler::subscribe_all(&self.aggregator, &self.bus);
        let coordinator = match self.pipeline.install() {
            Ok(task) => task,
            Err(err) => {
                for subscription in subscriptions {
                    subscription.unsubscribe();
                }
                return Err(err.into());
            }
        };
        let tasks = vec![
            coordinator,
            self.registry.start_health_checks(),
            self.queue.start_cleanup(),
            self.aggregator.start_cleanup(),
            self.limiter.start_cleanup(),
        ];
        *lifecycle = Lifecycle::Running {
            tasks,
            subscriptions,
        };
        tracing::info!(agents = self.registry.len(), "orchestrator started");
        Ok(())
    }

    /// Returns whether [`Orchestrator::start`] succeeded and no shutdown
    /// followed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle(), Lifecycle::Running { .. })
    }

    /// Submits an idea for evaluation by `agents`, or by every registered
    /// agent when `agents` is empty.
    ///
    /// # Errors
    ///
    /// Returns a pipeline error when the request cannot be enqueued.
    pub async fn submit(
        &self,
        idea: impl Into<String> + Send,
        agents: Vec<AgentType>,
        parameters: Value,
    ) -> OrchestratorResult<(EvaluationId, JobId)> {
        Ok(self.pipeline.submit(idea, agents, parameters).await?)
    }

    /// Collects a status view across every component.
    ///
    /// # Errors
    ///
    /// Returns a pipeline error when queue counts cannot be read.
    pub async fn status(&self) -> OrchestratorResult<OrchestratorStatus> {
        Ok(OrchestratorStatus {
            bus: self.bus.health_check(),
            queues: self.queue.get_metrics().await?,
            registered_agents: self.registry.len(),
            active_evaluations: self.pipeline.active_evaluations(),
            limiter: self.limiter.get_metrics(),
        })
    }

    /// Stops every background task, closes the queues, releases the
    /// agents and shuts the bus down.
    ///
    /// Queued jobs stay in the backend. Calling shutdown again is a no-op.
    pub async fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle(), Lifecycle::Stopped);
        if matches!(previous, Lifecycle::Stopped) {
            return;
        }
        if let Lifecycle::Running {
            tasks,
            subscriptions,
        } = previous
        {
            for task in tasks {
                task.stop().await;
            }
            for subscription in subscriptions {
                subscription.unsubscribe();
            }
        }
        self.queue.close().await;
        let released = self.registry.clear().await;
        let abandoned = self.bus.shutdown();
        tracing::info!(released, abandoned, "orchestrator shut down");
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B, C> fmt::Debug for Orchestrator<B, C>
where
    B: QueueBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("bus", &self.bus)
            .field("registry", &self.registry)
            .field("queue", &self.queue)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
