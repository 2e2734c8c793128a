//! Deterministic in-memory agent.
//!
//! Suitable for unit and integration tests and for local orchestration runs
//! where real analysis back-ends are unavailable. Behaviour (output, delay,
//! transient failures and health) is scripted up front and can be toggled
//! while the agent is registered.

use crate::scheduler::{
    domain::{AgentCapabilities, AgentType},
    ports::{
        Agent, AgentContext, AgentError, AgentHealthReport, AgentOutput, AgentRequest, AgentResult,
    },
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// Failure count meaning "fail on every execution".
const ALWAYS: u32 = u32::MAX;

/// Agent whose behaviour is fixed at construction.
#[derive(Debug)]
pub struct ScriptedAgent {
    agent_type: AgentType,
    capabilities: AgentCapabilities,
    output: Option<Value>,
    delay: Duration,
    probe_delay: Duration,
    version: String,
    failures_remaining: AtomicU32,
    executions: AtomicU32,
    healthy: AtomicBool,
    initialized: AtomicBool,
    cleaned_up: AtomicBool,
}

impl ScriptedAgent {
    /// Creates a healthy agent with no dependencies that succeeds
    /// immediately.
    #[must_use]
    pub fn new(agent_type: AgentType) -> Self {
        Self {
            agent_type,
            capabilities: AgentCapabilities::new(),
            output: None,
            delay: Duration::ZERO,
            probe_delay: Duration::ZERO,
            version: String::from("1.0.0"),
            failures_remaining: AtomicU32::new(0),
            executions: AtomicU32::new(0),
            healthy: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
            cleaned_up: AtomicBool::new(false),
        }
    }

    /// Declares the agents that must complete first.
    #[must_use]
    pub fn depending_on(mut self, dependencies: impl IntoIterator<Item = AgentType>) -> Self {
        self.capabilities = self.capabilities.depending_on(dependencies);
        self
    }

    /// Replaces the capability declaration.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: AgentCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Sets the output returned by successful executions.
    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    /// Makes every execution take `delay`.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes every health probe take `delay`.
    #[must_use]
    pub const fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    /// Fails the first `count` executions, then succeeds.
    #[must_use]
    pub fn failing_times(self, count: u32) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    /// Fails every execution.
    #[must_use]
    pub fn always_failing(self) -> Self {
        self.failing_times(ALWAYS)
    }

    /// Switches the health probe between success and failure.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Returns the number of executions started so far.
    #[must_use]
    pub fn executions(&self) -> u32 {
        self.executions.load(Ordering::SeqCst)
    }

    /// Returns whether cleanup has run.
    #[must_use]
    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| match remaining {
                0 => None,
                ALWAYS => Some(ALWAYS),
                other => Some(other.saturating_sub(1)),
            })
            .is_ok()
    }

    fn default_output(&self, request: &AgentRequest, context: &AgentContext) -> Value {
        let inputs: Vec<&str> = context
            .dependency_results()
            .keys()
            .map(AgentType::as_str)
            .collect();
        json!({
            "agent_type": self.agent_type.as_str(),
            "idea": request.idea,
            "inputs": inputs,
        })
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn agent_type(&self) -> AgentType {
        self.agent_type.clone()
    }

    fn capabilities(&self) -> AgentCapabilities {
        self.capabilities.clone()
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> AgentResult<()> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(
        &self,
        request: &AgentRequest,
        context: &AgentContext,
    ) -> AgentResult<AgentOutput> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        context.report_progress(10, Some("started")).await;

        if !self.delay.is_zero() {
            tokio::select! {
                () = context.cancellation().cancelled() => return Err(AgentError::Cancelled),
                () = tokio::time::sleep(self.delay) => {}
            }
        }

        if self.take_failure() {
            return Err(AgentError::execution(format!(
                "{} scripted failure on attempt {}",
                self.agent_type,
                context.attempt()
            )));
        }

        context.report_progress(90, Some("finalising")).await;
        let data = self
            .output
            .clone()
            .unwrap_or_else(|| self.default_output(request, context));
        Ok(AgentOutput::new(data))
    }

    async fn health_check(&self) -> AgentResult<AgentHealthReport> {
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        if self.healthy.load(Ordering::SeqCst) {
            Ok(AgentHealthReport::healthy(
                self.capabilities.clone(),
                self.version.clone(),
            ))
        } else {
            Err(AgentError::Unhealthy(format!(
                "{} probe failed",
                self.agent_type
            )))
        }
    }

    async fn cleanup(&self) -> AgentResult<()> {
        self.cleaned_up.store(true, Ordering::SeqCst);
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }
}
