//! Contract implemented by every analysis agent.

use crate::bus::domain::MessagePayload;
use crate::bus::services::MessageBus;
use crate::ids::EvaluationId;
use crate::scheduler::domain::{AgentCapabilities, AgentHealthStatus, AgentType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors an agent reports back to the orchestrator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    /// Start-up failed.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// The analysis itself failed.
    #[error("execution failed: {0}")]
    Execution(String),

    /// The agent reports it cannot serve requests.
    #[error("agent unhealthy: {0}")]
    Unhealthy(String),

    /// Work was abandoned because the caller cancelled it.
    #[error("execution cancelled")]
    Cancelled,

    /// Resource release failed.
    #[error("cleanup failed: {0}")]
    Cleanup(String),
}

impl AgentError {
    /// Creates an execution failure.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }
}

/// The business idea handed to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Evaluation the request belongs to.
    pub evaluation_id: EvaluationId,
    /// Free-text description of the idea under evaluation.
    pub idea: String,
    /// Additional caller-supplied parameters.
    #[serde(default)]
    pub parameters: Value,
}

impl AgentRequest {
    /// Creates a request without extra parameters.
    #[must_use]
    pub fn new(evaluation_id: EvaluationId, idea: impl Into<String>) -> Self {
        Self {
            evaluation_id,
            idea: idea.into(),
            parameters: Value::Null,
        }
    }

    /// Attaches caller-supplied parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Analysis produced by one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    data: Value,
}

impl AgentOutput {
    /// Wraps agent output data.
    #[must_use]
    pub const fn new(data: Value) -> Self {
        Self { data }
    }

    /// Returns the output data.
    #[must_use]
    pub const fn data(&self) -> &Value {
        &self.data
    }

    /// Consumes the output, returning its data.
    #[must_use]
    pub fn into_data(self) -> Value {
        self.data
    }
}

/// What an agent reports from a health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentHealthReport {
    /// Self-reported status.
    pub status: AgentHealthStatus,
    /// Current capability declaration.
    pub capabilities: AgentCapabilities,
    /// Agent implementation version.
    pub version: String,
    /// Optional detail message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AgentHealthReport {
    /// Creates a healthy report.
    #[must_use]
    pub fn healthy(capabilities: AgentCapabilities, version: impl Into<String>) -> Self {
        Self {
            status: AgentHealthStatus::Healthy,
            capabilities,
            version: version.into(),
            message: None,
        }
    }
}

/// Publishes `agent:progress` messages on behalf of a running agent.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    bus: MessageBus,
    evaluation_id: EvaluationId,
    agent_type: AgentType,
}

impl ProgressReporter {
    /// Creates a reporter bound to one agent run.
    #[must_use]
    pub const fn new(bus: MessageBus, evaluation_id: EvaluationId, agent_type: AgentType) -> Self {
        Self {
            bus,
            evaluation_id,
            agent_type,
        }
    }

    /// Publishes a progress update. Delivery failures are logged, not
    /// returned, so progress never fails the analysis.
    pub async fn report(&self, percentage: i64, note: Option<&str>) {
        let message = self.bus.message(MessagePayload::AgentProgress {
            evaluation_id: self.evaluation_id,
            agent_type: self.agent_type.clone(),
            percentage,
            note: note.map(ToOwned::to_owned),
        });
        if let Err(error) = self.bus.publish(message).await {
            tracing::debug!(
                evaluation_id = %self.evaluation_id,
                agent_type = %self.agent_type,
                %error,
                "progress update dropped"
            );
        }
    }
}

/// Per-run context supplied alongside an [`AgentRequest`].
#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    attempt: u32,
    dependency_results: BTreeMap<AgentType, Value>,
    progress: Option<ProgressReporter>,
    cancellation: CancellationToken,
}

impl AgentContext {
    /// Creates a first-attempt context with no dependency results.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the zero-based attempt number.
    #[must_use]
    pub const fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Supplies results of completed dependencies.
    #[must_use]
    pub fn with_dependency_results(mut self, results: BTreeMap<AgentType, Value>) -> Self {
        self.dependency_results = results;
        self
    }

    /// Attaches a progress reporter.
    #[must_use]
    pub fn with_progress(mut self, reporter: ProgressReporter) -> Self {
        self.progress = Some(reporter);
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the zero-based attempt number.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the output of a completed dependency.
    #[must_use]
    pub fn dependency_result(&self, agent_type: &AgentType) -> Option<&Value> {
        self.dependency_results.get(agent_type)
    }

    /// Returns all dependency results.
    #[must_use]
    pub const fn dependency_results(&self) -> &BTreeMap<AgentType, Value> {
        &self.dependency_results
    }

    /// Returns the cancellation token for this run.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Reports progress when a reporter is attached.
    pub async fn report_progress(&self, percentage: i64, note: Option<&str>) {
        if let Some(reporter) = &self.progress {
            reporter.report(percentage, note).await;
        }
    }
}

/// An independent analysis agent.
///
/// Implementations must be safe to share across tasks; the registry holds
/// them behind `Arc` and may probe health while an execution is running.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Agent: Send + Sync {
    /// Returns the unique agent type.
    fn agent_type(&self) -> AgentType;

    /// Returns the current capability declaration.
    fn capabilities(&self) -> AgentCapabilities;

    /// Returns whether [`Agent::initialize`] already ran.
    fn is_initialized(&self) -> bool {
        false
    }

    /// Prepares the agent for use.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Initialization`] when the agent cannot start.
    async fn initialize(&self) -> AgentResult<()>;

    /// Runs the analysis.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Execution`] when the analysis fails or
    /// [`AgentError::Cancelled`] when the context token fires.
    async fn execute(&self, request: &AgentRequest, context: &AgentContext)
    -> AgentResult<AgentOutput>;

    /// Probes agent health.
    ///
    /// # Errors
    ///
    /// Returns an error when the agent cannot answer the probe.
    async fn health_check(&self) -> AgentResult<AgentHealthReport>;

    /// Releases agent resources.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cleanup`] when release fails.
    async fn cleanup(&self) -> AgentResult<()>;
}
