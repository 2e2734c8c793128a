//! Bus handler folding agent lifecycle messages into progress snapshots.

use crate::bus::{
    domain::{HandlerError, Message, MessagePayload, MessageType},
    ports::{HandlerResult, MessageHandler},
    services::{MessageBus, Subscription},
};
use crate::progress::domain::{AgentRunStatus, EvaluationProgress, ProgressResult};
use crate::progress::services::ProgressAggregator;
use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;

/// Message types the aggregator consumes.
pub const CONSUMED_TYPES: [MessageType; 6] = [
    MessageType::AgentStart,
    MessageType::AgentProgress,
    MessageType::AgentComplete,
    MessageType::AgentError,
    MessageType::EvaluationComplete,
    MessageType::EvaluationError,
];

/// Applies agent and evaluation messages to a [`ProgressAggregator`].
///
/// Only messages for tracked evaluations are handled. After each change an
/// `evaluation:status` message carrying the new overall progress is
/// published when a status bus is attached.
pub struct ProgressEventHandler<C: Clock + Send + Sync + 'static> {
    aggregator: ProgressAggregator<C>,
    status_bus: Option<MessageBus>,
}

impl<C: Clock + Send + Sync + 'static> ProgressEventHandler<C> {
    /// Creates a handler for `aggregator`.
    #[must_use]
    pub const fn new(aggregator: ProgressAggregator<C>) -> Self {
        Self {
            aggregator,
            status_bus: None,
        }
    }

    /// Publishes `evaluation:status` updates on `bus`.
    #[must_use]
    pub fn with_status_updates(mut self, bus: MessageBus) -> Self {
        self.status_bus = Some(bus);
        self
    }

    /// Subscribes a handler for every consumed message type.
    #[must_use]
    pub fn subscribe_all(aggregator: &ProgressAggregator<C>, bus: &MessageBus) -> Vec<Subscription> {
        let handler: Arc<dyn MessageHandler> =
            Arc::new(Self::new(aggregator.clone()).with_status_updates(bus.clone()));
        CONSUMED_TYPES
            .iter()
            .map(|message_type| bus.subscribe_shared(*message_type, Arc::clone(&handler)))
            .collect()
    }

    fn apply(&self, payload: &MessagePayload) -> Option<ProgressResult<EvaluationProgress>> {
        let aggregator = &self.aggregator;
        let outcome = match payload {
            MessagePayload::AgentStart {
                evaluation_id,
                agent_type,
            } => aggregator.update_agent_progress(
                *evaluation_id,
                agent_type,
                AgentRunStatus::Running,
                0,
            ),
            MessagePayload::AgentProgress {
                evaluation_id,
                agent_type,
                percentage,
                ..
            } => aggregator.update_agent_progress(
                *evaluation_id,
                agent_type,
                AgentRunStatus::Running,
                *percentage,
            ),
            MessagePayload::AgentComplete {
                evaluation_id,
                agent_type,
                ..
            } => aggregator.update_agent_progress(
                *evaluation_id,
                agent_type,
                AgentRunStatus::Completed,
                100,
            ),
            MessagePayload::AgentError {
                evaluation_id,
                agent_type,
                error,
                terminal,
            } => aggregator.record_agent_error(*evaluation_id, agent_type, error.clone(), *terminal),
            MessagePayload::EvaluationComplete { evaluation_id, .. } => {
                aggregator.complete_evaluation(*evaluation_id)
            }
            MessagePayload::EvaluationError {
                evaluation_id,
                error,
            } => aggregator.fail_evaluation(*evaluation_id, error.clone()),
            _ => return None,
        };
        Some(outcome)
    }

    async fn announce(&self, snapshot: &EvaluationProgress) {
        let Some(bus) = &self.status_bus else {
            return;
        };
        let message = bus.message(MessagePayload::EvaluationStatus {
            evaluation_id: snapshot.evaluation_id(),
            state: snapshot.state(),
            overall_progress: snapshot.overall_progress(),
        });
        if let Err(error) = bus.publish(message).await {
            tracing::debug!(
                evaluation_id = %snapshot.evaluation_id(),
                %error,
                "status update dropped"
            );
        }
    }
}

#[async_trait]
impl<C: Clock + Send + Sync + 'static> MessageHandler for ProgressEventHandler<C> {
    fn name(&self) -> &str {
        "progress-aggregator"
    }

    fn can_handle(&self, message: &Message) -> bool {
        message
            .payload()
            .evaluation_id()
            .is_some_and(|evaluation_id| self.aggregator.contains(evaluation_id))
    }

    async fn handle(&self, message: &Message) -> HandlerResult {
        match self.apply(message.payload()) {
            None => Ok(()),
            Some(Ok(snapshot)) => {
                self.announce(&snapshot).await;
                Ok(())
            }
            Some(Err(error)) => Err(HandlerError::new(error.to_string())),
        }
    }
}
