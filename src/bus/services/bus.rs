//! Typed publish/subscribe dispatcher with request/reply support.
//!
//! Provides [`MessageBus`], a cheaply clonable handle shared by every
//! component. Handlers are keyed by [`MessageType`]; each published message
//! fans out to all matching handlers concurrently, each on its own task so a
//! panic or error in one handler is captured locally.

use crate::bus::{
    domain::{
        BusConfig, BusError, BusHealth, BusHealthStatus, BusResult, BusStats, CorrelationId,
        HandlerError, Message, MessageId, MessagePayload, MessageType,
    },
    ports::{HandlerResult, MessageHandler},
};
use crate::ids::EvaluationId;
use mockable::{Clock, DefaultClock};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;

/// Identifier of one handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Handle returned by [`MessageBus::subscribe`].
///
/// The registration stays active until [`Subscription::unsubscribe`] or
/// [`MessageBus::unsubscribe`] is called; dropping the handle does not
/// remove the handler.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    message_type: MessageType,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Returns the registration identifier.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the subscribed message type.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Removes the handler from the bus.
    ///
    /// Returns `false` when it was already removed or the bus is gone.
    pub fn unsubscribe(self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|inner| inner.remove_handler(self.message_type, self.id))
    }
}

/// A handler failure captured during dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// Name of the failing handler.
    pub handler: String,
    /// Captured failure.
    pub error: HandlerError,
}

/// Outcome of a successful [`MessageBus::publish`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Identifier of the published message.
    pub message_id: MessageId,
    /// Number of handlers the message was dispatched to.
    pub handlers_invoked: usize,
    /// Handlers that failed or panicked.
    pub failures: Vec<HandlerFailure>,
    /// Pending request resolved by this message instead of dispatching it.
    pub resolved_request: Option<CorrelationId>,
}

impl PublishReport {
    /// Returns whether every invoked handler succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Query over the bounded message history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    /// Only return messages of this type.
    pub message_type: Option<MessageType>,
    /// Only return messages about this evaluation.
    pub evaluation_id: Option<EvaluationId>,
    /// Return at most this many of the most recent matches.
    pub limit: Option<usize>,
}

impl HistoryFilter {
    /// Restricts results to a message type.
    #[must_use]
    pub const fn of_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    /// Restricts results to an evaluation.
    #[must_use]
    pub const fn for_evaluation(mut self, evaluation_id: EvaluationId) -> Self {
        self.evaluation_id = Some(evaluation_id);
        self
    }

    /// Caps the number of returned messages.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, message: &Message) -> bool {
        self.message_type
            .is_none_or(|kind| kind == message.message_type())
            && self
                .evaluation_id
                .is_none_or(|id| message.payload().evaluation_id() == Some(id))
    }
}

/// Typed publish/subscribe and request/reply message bus.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

type Responder = oneshot::Sender<BusResult<Message>>;

struct BusInner {
    config: BusConfig,
    clock: Arc<dyn Clock + Send + Sync>,
    handlers: RwLock<HashMap<MessageType, Vec<RegisteredHandler>>>,
    history: Mutex<VecDeque<Arc<Message>>>,
    pending: Mutex<HashMap<CorrelationId, Responder>>,
    shut_down: AtomicBool,
    next_subscription: AtomicU64,
    counters: Counters,
}

#[derive(Clone)]
struct RegisteredHandler {
    id: SubscriptionId,
    handler: Arc<dyn MessageHandler>,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    deliveries: AtomicU64,
    handler_failures: AtomicU64,
    requests_resolved: AtomicU64,
    requests_timed_out: AtomicU64,
}

fn count(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

impl BusInner {
    fn lock_pending(&self) -> MutexGuard<'_, HashMap<CorrelationId, Responder>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_history(&self) -> MutexGuard<'_, VecDeque<Arc<Message>>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_pending(&self, correlation_id: CorrelationId) -> Option<Responder> {
        self.lock_pending().remove(&correlation_id)
    }

    fn remove_handler(&self, message_type: MessageType, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(registered) = handlers.get_mut(&message_type) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|entry| entry.id != id);
        let removed = registered.len() != before;
        if registered.is_empty() {
            handlers.remove(&message_type);
        }
        removed
    }

    fn record(&self, message: Arc<Message>) {
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        let mut history = self.lock_history();
        history.push_back(message);
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }

    fn handlers_for(&self, message: &Message) -> Vec<Arc<dyn MessageHandler>> {
        let snapshot: Vec<RegisteredHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&message.message_type())
            .cloned()
            .unwrap_or_default();
        snapshot
            .into_iter()
            .map(|entry| entry.handler)
            .filter(|handler| handler.can_handle(message))
            .collect()
    }

    async fn dispatch(&self, message: &Arc<Message>) -> (usize, Vec<HandlerFailure>) {
        let handlers = self.handlers_for(message);
        let invoked = handlers.len();
        self.counters
            .deliveries
            .fetch_add(count(invoked), Ordering::Relaxed);

        let running: Vec<(String, JoinHandle<HandlerResult>)> = handlers
            .into_iter()
            .map(|handler| {
                let name = handler.name().to_owned();
                let shared = Arc::clone(message);
                let task = tokio::spawn(async move { handler.handle(&shared).await });
                (name, task)
            })
            .collect();

        let mut failures = Vec::new();
        for (handler, task) in running {
            let outcome = match task.await {
                Ok(result) => result,
                Err(err) => Err(HandlerError::new(format!("handler panicked: {err}"))),
            };
            if let Err(error) = outcome {
                tracing::warn!(
                    handler = %handler,
                    message_id = %message.id(),
                    message_type = %message.message_type(),
                    error = %error,
                    "message handler failed"
                );
                failures.push(HandlerFailure { handler, error });
            }
        }
        self.counters
            .handler_failures
            .fetch_add(count(failures.len()), Ordering::Relaxed);
        (invoked, failures)
    }
}

impl MessageBus {
    /// Creates a bus using the system clock.
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        Self::with_clock(config, Arc::new(DefaultClock))
    }

    /// Creates a bus stamping internally generated messages with `clock`.
    #[must_use]
    pub fn with_clock(config: BusConfig, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                clock,
                handlers: RwLock::new(HashMap::new()),
                history: Mutex::new(VecDeque::new()),
                pending: Mutex::new(HashMap::new()),
                shut_down: AtomicBool::new(false),
                next_subscription: AtomicU64::new(1),
                counters: Counters::default(),
            }),
        }
    }

    /// Returns the bus configuration.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Builds a message stamped with the bus clock.
    #[must_use]
    pub fn message(&self, payload: MessagePayload) -> Message {
        Message::at(payload, self.inner.clock.utc())
    }

    /// Registers a handler for one message type.
    pub fn subscribe<H>(&self, message_type: MessageType, handler: H) -> Subscription
    where
        H: MessageHandler + 'static,
    {
        self.subscribe_shared(message_type, Arc::new(handler))
    }

    /// Registers an already shared handler for one message type.
    pub fn subscribe_shared(
        &self,
        message_type: MessageType,
        handler: Arc<dyn MessageHandler>,
    ) -> Subscription {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(subscription = %id, handler = handler.name(), %message_type, "handler subscribed");
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(message_type)
            .or_default()
            .push(RegisteredHandler { id, handler });
        Subscription {
            id,
            message_type,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Removes a handler registration. Removing twice is a no-op.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.inner
            .remove_handler(subscription.message_type, subscription.id)
    }

    /// Publishes a message.
    ///
    /// The message is appended to history first. A message replying to a
    /// pending request resolves that request and is not dispatched.
    /// Otherwise every matching handler runs concurrently; failures are
    /// logged, reported as `handler-error` messages and listed in the
    /// returned report, but never fail the publish call.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ShutDown`] after [`MessageBus::shutdown`].
    pub async fn publish(&self, message: Message) -> BusResult<PublishReport> {
        self.ensure_running()?;
        let shared = Arc::new(message);
        self.inner.record(Arc::clone(&shared));

        if let Some(correlation_id) = shared.reply_to()
            && let Some(responder) = self.inner.take_pending(correlation_id)
        {
            self.inner
                .counters
                .requests_resolved
                .fetch_add(1, Ordering::Relaxed);
            if responder.send(Ok(Message::clone(&shared))).is_err() {
                tracing::debug!(%correlation_id, "requester went away before its reply arrived");
            }
            return Ok(PublishReport {
                message_id: shared.id(),
                handlers_invoked: 0,
                failures: Vec::new(),
                resolved_request: Some(correlation_id),
            });
        }

        let (handlers_invoked, failures) = self.inner.dispatch(&shared).await;
        if !failures.is_empty() {
            self.report_failures(&shared, &failures).await;
        }
        Ok(PublishReport {
            message_id: shared.id(),
            handlers_invoked,
            failures,
            resolved_request: None,
        })
    }

    async fn report_failures(&self, source: &Message, failures: &[HandlerFailure]) {
        // Failures while handling handler-error events are only logged.
        if source.message_type() == MessageType::HandlerError {
            return;
        }
        for failure in failures {
            let event = Arc::new(self.message(MessagePayload::HandlerError {
                message_id: source.id(),
                message_type: source.message_type(),
                handler: failure.handler.clone(),
                error: failure.error.to_string(),
            }));
            self.inner.record(Arc::clone(&event));
            self.inner.dispatch(&event).await;
        }
    }

    /// Publishes `message` as a request and waits for its reply.
    ///
    /// A fresh correlation identifier is attached to the message; the first
    /// published message whose `reply_to` matches it resolves the request.
    /// The timer starts before dispatch, so subscribers that are slow to
    /// handle the request itself do not delay the timeout.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::RequestTimeout`] when no reply arrives within
    /// `timeout`, or [`BusError::ShutDown`] when the bus shuts down first.
    #[tracing::instrument(skip(self, message), fields(message_type = %message.message_type()))]
    pub async fn request(&self, message: Message, timeout: Duration) -> BusResult<Message> {
        self.ensure_running()?;
        let correlation_id = CorrelationId::new();
        let (responder, reply) = oneshot::channel();
        self.inner.lock_pending().insert(correlation_id, responder);

        // Dispatch runs detached so slow subscribers cannot hold the timer.
        let bus = self.clone();
        let outgoing = message.with_correlation_id(correlation_id);
        tokio::spawn(async move {
            if let Err(err) = bus.publish(outgoing).await
                && let Some(waiter) = bus.inner.take_pending(correlation_id)
                && waiter.send(Err(err)).is_err()
            {
                tracing::debug!(%correlation_id, "requester went away before publish failed");
            }
        });

        match time::timeout(timeout, reply).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(BusError::ShutDown),
            Err(_) => {
                if self.inner.take_pending(correlation_id).is_some() {
                    self.inner
                        .counters
                        .requests_timed_out
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(%correlation_id, ?timeout, "request timed out");
                }
                Err(BusError::RequestTimeout {
                    correlation_id,
                    timeout,
                })
            }
        }
    }

    /// Sends a request using the configured default timeout.
    ///
    /// # Errors
    ///
    /// See [`MessageBus::request`].
    pub async fn request_default(&self, message: Message) -> BusResult<Message> {
        let timeout = self.inner.config.default_request_timeout();
        self.request(message, timeout).await
    }

    /// Reports back-pressure status from the pending request count.
    #[must_use]
    pub fn health_check(&self) -> BusHealth {
        let pending_requests = self.pending_requests();
        BusHealth {
            status: BusHealthStatus::classify(
                pending_requests,
                self.inner.config.degraded_pending_threshold,
                self.inner.config.unhealthy_pending_threshold,
            ),
            pending_requests,
            subscriptions: self.subscription_count(),
            history_len: self.inner.lock_history().len(),
        }
    }

    /// Returns the number of requests awaiting a reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.lock_pending().len()
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Returns the bus counters.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        let counters = &self.inner.counters;
        BusStats {
            published: counters.published.load(Ordering::Relaxed),
            deliveries: counters.deliveries.load(Ordering::Relaxed),
            handler_failures: counters.handler_failures.load(Ordering::Relaxed),
            requests_resolved: counters.requests_resolved.load(Ordering::Relaxed),
            requests_timed_out: counters.requests_timed_out.load(Ordering::Relaxed),
        }
    }

    /// Returns retained messages matching `filter`, oldest first.
    #[must_use]
    pub fn history(&self, filter: HistoryFilter) -> Vec<Message> {
        let history = self.inner.lock_history();
        let mut matching: Vec<Message> = history
            .iter()
            .rev()
            .filter(|message| filter.matches(message))
            .take(filter.limit.unwrap_or(usize::MAX))
            .map(|message| Message::clone(message))
            .collect();
        matching.reverse();
        matching
    }

    /// Returns whether [`MessageBus::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Shuts the bus down.
    ///
    /// Every pending request is rejected with [`BusError::ShutDown`], and all
    /// handlers and history are cleared. Returns the number of rejected
    /// requests; calling it again returns zero.
    pub fn shutdown(&self) -> usize {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let pending: Vec<Responder> = self
            .inner
            .lock_pending()
            .drain()
            .map(|(_, responder)| responder)
            .collect();
        let rejected = pending.len();
        for responder in pending {
            if responder.send(Err(BusError::ShutDown)).is_err() {
                tracing::debug!("requester went away before shutdown");
            }
        }
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner.lock_history().clear();
        tracing::info!(rejected_requests = rejected, "message bus shut down");
        rejected
    }

    fn ensure_running(&self) -> BusResult<()> {
        if self.is_shut_down() {
            return Err(BusError::ShutDown);
        }
        Ok(())
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("config", &self.inner.config)
            .field("subscriptions", &self.subscription_count())
            .field("pending_requests", &self.pending_requests())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
