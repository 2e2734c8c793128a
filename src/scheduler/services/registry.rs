//! Agent registry service.
//!
//! Owns the set of registered agents and the dependency graph derived from
//! their declarations. Locks are synchronous and never held across an
//! `.await`, so a slow health probe or agent call cannot block
//! registration.

use crate::background::BackgroundTask;
use crate::bus::domain::MessagePayload;
use crate::bus::services::MessageBus;
use crate::scheduler::{
    domain::{
        AgentDescriptor, AgentHealthSnapshot, AgentHealthStatus, AgentType, DependencyGraph,
        DependencyIssue, DependencyNode, DependencyValidation, ExecutionGroup, ExecutionPlan,
        RegistryConfig,
    },
    ports::{Agent, AgentContext, AgentError, AgentHealthReport, AgentOutput, AgentRequest},
};
use mockable::Clock;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::BuildHasher;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Errors returned by the agent registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// An agent with the same type is already registered.
    #[error("agent {0} is already registered")]
    DuplicateAgent(AgentType),

    /// No agent with this type is registered.
    #[error("agent {0} is not registered")]
    UnknownAgent(AgentType),

    /// Agent initialization failed during registration.
    #[error("agent {agent_type} failed to initialize: {source}")]
    Initialization {
        /// Agent that failed.
        agent_type: AgentType,
        /// Underlying agent error.
        source: AgentError,
    },

    /// Agent execution failed.
    #[error("agent {agent_type} failed: {source}")]
    Execution {
        /// Agent that failed.
        agent_type: AgentType,
        /// Underlying agent error.
        source: AgentError,
    },

    /// The requested agents cannot be ordered because of a cycle.
    #[error("circular dependency detected: {}", describe(.issues))]
    CycleDetected {
        /// Every issue found while planning.
        issues: Vec<DependencyIssue>,
    },

    /// The requested agents depend on agents that are not registered.
    #[error("unresolved dependencies: {}", describe(.issues))]
    UnresolvedDependencies {
        /// Every issue found while planning.
        issues: Vec<DependencyIssue>,
    },
}

fn describe(issues: &[DependencyIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Outcome of one agent's health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckOutcome {
    /// Probed agent.
    pub agent_type: AgentType,
    /// Status before the probe.
    pub previous: AgentHealthStatus,
    /// Status after the probe.
    pub current: AgentHealthStatus,
}

impl HealthCheckOutcome {
    /// Returns whether the probe changed the agent's status.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

struct RegisteredAgent {
    agent: Arc<dyn Agent>,
    descriptor: AgentDescriptor,
}

struct RegistryInner<C> {
    config: RegistryConfig,
    bus: MessageBus,
    clock: Arc<C>,
    agents: RwLock<BTreeMap<AgentType, RegisteredAgent>>,
    graph: RwLock<DependencyGraph>,
}

/// Registry of analysis agents and their dependency graph.
pub struct AgentRegistry<C: Clock + Send + Sync + 'static> {
    inner: Arc<RegistryInner<C>>,
}

impl<C: Clock + Send + Sync + 'static> Clone for AgentRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock + Send + Sync + 'static> AgentRegistry<C> {
    /// Creates an empty registry publishing health events on `bus`.
    #[must_use]
    pub fn new(config: RegistryConfig, bus: MessageBus, clock: Arc<C>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                bus,
                clock,
                agents: RwLock::new(BTreeMap::new()),
                graph: RwLock::new(DependencyGraph::default()),
            }),
        }
    }

    /// Returns the registry configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Registers an agent, initializing it first when needed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateAgent`] when the type is taken or
    /// [`RegistryError::Initialization`] when the agent fails to start.
    pub async fn register(&self, agent: Arc<dyn Agent>) -> RegistryResult<AgentDescriptor> {
        let agent_type = agent.agent_type();
        if self.contains(&agent_type) {
            return Err(RegistryError::DuplicateAgent(agent_type));
        }

        let initialized_here = !agent.is_initialized();
        if initialized_here {
            agent
                .initialize()
                .await
                .map_err(|source| RegistryError::Initialization {
                    agent_type: agent_type.clone(),
                    source,
                })?;
        }

        let descriptor =
            AgentDescriptor::new(agent_type.clone(), agent.capabilities(), &*self.inner.clock);
        let inserted = {
            let mut agents = self.write_agents();
            let vacant = !agents.contains_key(&agent_type);
            if vacant {
                agents.insert(
                    agent_type.clone(),
                    RegisteredAgent {
                        agent: Arc::clone(&agent),
                        descriptor: descriptor.clone(),
                    },
                );
                self.rebuild_graph(&agents);
            }
            vacant
        };
        if !inserted {
            // A concurrent registration won; release what this call started.
            if initialized_here && let Err(error) = agent.cleanup().await {
                tracing::warn!(agent_type = %agent_type, %error, "agent cleanup failed");
            }
            return Err(RegistryError::DuplicateAgent(agent_type));
        }

        tracing::info!(
            agent_type = %agent_type,
            dependencies = descriptor.capabilities().dependencies().len(),
            "agent registered"
        );
        Ok(descriptor)
    }

    /// Removes an agent and runs its cleanup.
    ///
    /// Cleanup failures are logged; the agent stays removed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownAgent`] when nothing is registered
    /// under `agent_type`.
    pub async fn unregister(&self, agent_type: &AgentType) -> RegistryResult<AgentDescriptor> {
        let removed = {
            let mut agents = self.write_agents();
            let entry = agents
                .remove(agent_type)
                .ok_or_else(|| RegistryError::UnknownAgent(agent_type.clone()))?;
            self.rebuild_graph(&agents);
            entry
        };

        if let Err(error) = removed.agent.cleanup().await {
            tracing::warn!(agent_type = %agent_type, %error, "agent cleanup failed");
        }
        tracing::info!(agent_type = %agent_type, "agent unregistered");
        Ok(removed.descriptor)
    }

    /// Unregisters every agent, returning how many were removed.
    pub async fn clear(&self) -> usize {
        let removed: Vec<RegisteredAgent> = {
            let mut agents = self.write_agents();
            let drained = std::mem::take(&mut *agents);
            self.rebuild_graph(&agents);
            drained.into_values().collect()
        };
        for entry in &removed {
            if let Err(error) = entry.agent.cleanup().await {
                tracing::warn!(
                    agent_type = %entry.descriptor.agent_type(),
                    %error,
                    "agent cleanup failed"
                );
            }
        }
        removed.len()
    }

    /// Returns whether `agent_type` is registered.
    #[must_use]
    pub fn contains(&self, agent_type: &AgentType) -> bool {
        self.read_agents().contains_key(agent_type)
    }

    /// Returns the number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_agents().len()
    }

    /// Returns whether no agents are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_agents().is_empty()
    }

    /// Returns the descriptor for `agent_type`.
    #[must_use]
    pub fn get(&self, agent_type: &AgentType) -> Option<AgentDescriptor> {
        self.read_agents()
            .get(agent_type)
            .map(|entry| entry.descriptor.clone())
    }

    /// Returns every descriptor in agent-type order.
    #[must_use]
    pub fn list(&self) -> Vec<AgentDescriptor> {
        self.read_agents()
            .values()
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    /// Returns agents that declare `capability`.
    #[must_use]
    pub fn agents_providing(&self, capability: &str) -> Vec<AgentType> {
        self.read_agents()
            .values()
            .filter(|entry| {
                entry
                    .descriptor
                    .capabilities()
                    .provides_capability(capability)
            })
            .map(|entry| entry.descriptor.agent_type().clone())
            .collect()
    }

    /// Returns agents whose latest health status is available for work.
    #[must_use]
    pub fn healthy_agents(&self) -> Vec<AgentType> {
        self.read_agents()
            .values()
            .filter(|entry| entry.descriptor.health().status().is_available())
            .map(|entry| entry.descriptor.agent_type().clone())
            .collect()
    }

    /// Returns the dependency node for `agent_type`.
    #[must_use]
    pub fn node(&self, agent_type: &AgentType) -> Option<DependencyNode> {
        self.read_graph().node(agent_type).cloned()
    }

    /// Reports missing dependencies and cycles across all agents.
    #[must_use]
    pub fn validate_dependencies(&self) -> DependencyValidation {
        self.read_graph().validate()
    }

    /// Returns the execution order for every registered agent.
    #[must_use]
    pub fn execution_order(&self) -> ExecutionPlan {
        self.read_graph().execution_plan()
    }

    /// Returns parallel execution groups for every registered agent.
    #[must_use]
    pub fn parallel_execution_groups(&self) -> Vec<ExecutionGroup> {
        self.read_graph().parallel_groups()
    }

    /// Plans `agent_types` together with their transitive dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownAgent`] for an unregistered request,
    /// [`RegistryError::CycleDetected`] when the requested agents form a
    /// cycle, or [`RegistryError::UnresolvedDependencies`] when a
    /// dependency is missing.
    pub fn plan_for(&self, agent_types: &[AgentType]) -> RegistryResult<ExecutionPlan> {
        let graph = self.read_graph();
        if let Some(unknown) = agent_types
            .iter()
            .find(|agent_type| graph.node(agent_type).is_none())
        {
            return Err(RegistryError::UnknownAgent(unknown.clone()));
        }

        let plan = graph.restricted_to(agent_types).execution_plan();
        if plan.is_complete() {
            return Ok(plan);
        }

        let issues = plan.issues().to_vec();
        if issues.iter().any(DependencyIssue::is_cycle) {
            Err(RegistryError::CycleDetected { issues })
        } else {
            Err(RegistryError::UnresolvedDependencies { issues })
        }
    }

    /// Returns whether `agent_type` is registered and all its dependencies
    /// appear in `completed`.
    #[must_use]
    pub fn can_agent_execute<S: BuildHasher>(
        &self,
        agent_type: &AgentType,
        completed: &HashSet<AgentType, S>,
    ) -> bool {
        self.read_graph().can_execute(agent_type, completed)
    }

    /// Runs one agent.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownAgent`] when the agent is not
    /// registered or [`RegistryError::Execution`] when it fails.
    pub async fn execute(
        &self,
        agent_type: &AgentType,
        request: &AgentRequest,
        context: &AgentContext,
    ) -> RegistryResult<AgentOutput> {
        let agent = self
            .read_agents()
            .get(agent_type)
            .map(|entry| Arc::clone(&entry.agent))
            .ok_or_else(|| RegistryError::UnknownAgent(agent_type.clone()))?;

        agent
            .execute(request, context)
            .await
            .map_err(|source| RegistryError::Execution {
                agent_type: agent_type.clone(),
                source,
            })
    }

    /// Probes every agent once.
    ///
    /// Each probe gets the configured timeout. A failed or timed-out probe
    /// marks the agent `error` without unregistering it. An `agent:health`
    /// message is published for every failed probe and once more when the
    /// agent recovers.
    pub async fn check_health(&self) -> Vec<HealthCheckOutcome> {
        let agents: Vec<(AgentType, Arc<dyn Agent>)> = self
            .read_agents()
            .iter()
            .map(|(agent_type, entry)| (agent_type.clone(), Arc::clone(&entry.agent)))
            .collect();

        let timeout = self.inner.config.health_check_timeout();
        let mut outcomes = Vec::with_capacity(agents.len());
        for (agent_type, agent) in agents {
            let probe = tokio::time::timeout(timeout, agent.health_check()).await;
            let checked_at = self.inner.clock.utc();
            let (snapshot, report) = match probe {
                Ok(Ok(report)) => (
                    AgentHealthSnapshot::new(report.status, checked_at)
                        .with_version(report.version.clone())
                        .with_message(report.message.clone().unwrap_or_default()),
                    Some(report),
                ),
                Ok(Err(error)) => (AgentHealthSnapshot::error(checked_at, error.to_string()), None),
                Err(_) => (
                    AgentHealthSnapshot::error(
                        checked_at,
                        format!("health check timed out after {}ms", timeout.as_millis()),
                    ),
                    None,
                ),
            };

            if let Some(outcome) = self.apply_health(&agent_type, snapshot.clone(), report) {
                if outcome.current == AgentHealthStatus::Error
                    || (outcome.changed() && outcome.previous == AgentHealthStatus::Error)
                {
                    self.publish_health(&agent_type, &snapshot).await;
                }
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Starts periodic health probing at the configured interval.
    #[must_use]
    pub fn start_health_checks(&self) -> BackgroundTask {
        let registry = self.clone();
        BackgroundTask::every(
            "agent-health-checks",
            self.inner.config.health_check_interval(),
            move || {
                let round = registry.clone();
                async move {
                    let outcomes = round.check_health().await;
                    tracing::debug!(probed = outcomes.len(), "health check round finished");
                }
            },
        )
    }

    fn apply_health(
        &self,
        agent_type: &AgentType,
        snapshot: AgentHealthSnapshot,
        report: Option<AgentHealthReport>,
    ) -> Option<HealthCheckOutcome> {
        let mut agents = self.write_agents();
        let entry = agents.get_mut(agent_type)?;
        let previous = entry.descriptor.health().status();
        let current = snapshot.status();

        let mut descriptor = entry.descriptor.clone().with_health(snapshot);
        let capabilities_changed = report
            .as_ref()
            .is_some_and(|reported| reported.capabilities != *descriptor.capabilities());
        if let Some(reported) = report
            && capabilities_changed
        {
            descriptor = descriptor.with_capabilities(reported.capabilities);
        }
        entry.descriptor = descriptor;

        if capabilities_changed {
            self.rebuild_graph(&agents);
        }
        if current == AgentHealthStatus::Error {
            tracing::warn!(agent_type = %agent_type, "agent health check failed");
        }
        Some(HealthCheckOutcome {
            agent_type: agent_type.clone(),
            previous,
            current,
        })
    }

    async fn publish_health(&self, agent_type: &AgentType, snapshot: &AgentHealthSnapshot) {
        let message = self.inner.bus.message(MessagePayload::AgentHealth {
            agent_type: agent_type.clone(),
            status: snapshot.status(),
            detail: snapshot.message().map(ToOwned::to_owned),
        });
        if let Err(error) = self.inner.bus.publish(message).await {
            tracing::debug!(agent_type = %agent_type, %error, "health event dropped");
        }
    }

    fn rebuild_graph(&self, agents: &BTreeMap<AgentType, RegisteredAgent>) {
        let graph = DependencyGraph::build(agents.iter().map(|(agent_type, entry)| {
            (
                agent_type.clone(),
                entry.descriptor.capabilities().dependencies().to_vec(),
            )
        }));
        for issue in graph.validate().issues() {
            tracing::warn!(issue = %issue, "dependency graph issue");
        }
        *self
            .inner
            .graph
            .write()
            .unwrap_or_else(PoisonError::into_inner) = graph;
    }

    fn read_agents(&self) -> RwLockReadGuard<'_, BTreeMap<AgentType, RegisteredAgent>> {
        self.inner
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_agents(&self) -> RwLockWriteGuard<'_, BTreeMap<AgentType, RegisteredAgent>> {
        self.inner
            .agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_graph(&self) -> RwLockReadGuard<'_, DependencyGraph> {
        self.inner
            .graph
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Clock + Send + Sync + 'static> fmt::Debug for AgentRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("config", &self.inner.config)
            .field("agents", &self.read_agents().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
