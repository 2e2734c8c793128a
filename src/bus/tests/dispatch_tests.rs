//! Unit tests for publish/subscribe dispatch.

use crate::bus::{
    adapters::FnHandler,
    domain::{BusConfig, BusError, HandlerError, Message, MessagePayload, MessageType},
    ports::HandlerResult,
    services::{HistoryFilter, MessageBus},
};
use crate::ids::EvaluationId;
use crate::scheduler::domain::AgentType;
use rstest::{fixture, rstest};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[fixture]
fn bus() -> MessageBus {
    MessageBus::new(BusConfig::default())
}

fn start_message(bus: &MessageBus) -> Message {
    bus.message(MessagePayload::AgentStart {
        evaluation_id: EvaluationId::new(),
        agent_type: AgentType::new("market_research").expect("valid agent type"),
    })
}

fn counting_handler(
    name: &str,
    counter: &Arc<AtomicUsize>,
    fail: bool,
) -> FnHandler<impl Fn(Message) -> futures_ready::Ready + Send + Sync + use<>> {
    let shared = Arc::clone(counter);
    FnHandler::new(name, move |_message| {
        shared.fetch_add(1, Ordering::SeqCst);
        futures_ready::ready(fail)
    })
}

/// Minimal ready future so handlers can be built from plain closures.
mod futures_ready {
    use crate::bus::{domain::HandlerError, ports::HandlerResult};
    use std::future::{self, Ready as StdReady};

    pub type Ready = StdReady<HandlerResult>;

    pub fn ready(fail: bool) -> Ready {
        if fail {
            future::ready(Err(HandlerError::new("handler refused message")))
        } else {
            future::ready(Ok(()))
        }
    }
}

#[rstest]
#[tokio::test]
async fn failing_handler_does_not_block_siblings(bus: MessageBus) {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let third = Arc::new(AtomicUsize::new(0));
    bus.subscribe(MessageType::AgentStart, counting_handler("first", &first, false));
    bus.subscribe(MessageType::AgentStart, counting_handler("second", &second, true));
    bus.subscribe(MessageType::AgentStart, counting_handler("third", &third, false));

    let report = bus
        .publish(start_message(&bus))
        .await
        .expect("publish should succeed");

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert_eq!(third.load(Ordering::SeqCst), 1);
    assert_eq!(report.handlers_invoked, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(
        report.failures.first().map(|failure| failure.handler.as_str()),
        Some("second")
    );
}

#[rstest]
#[tokio::test]
async fn handler_failure_is_published_as_handler_error(bus: MessageBus) {
    let observed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&observed);
    bus.subscribe(
        MessageType::HandlerError,
        FnHandler::new("monitor", move |message: Message| {
            let hits = Arc::clone(&counter);
            async move {
                if let MessagePayload::HandlerError { handler, .. } = message.payload() {
                    assert_eq!(handler, "broken");
                    hits.fetch_add(1, Ordering::SeqCst);
                }
                HandlerResult::Ok(())
            }
        }),
    );
    bus.subscribe(
        MessageType::AgentStart,
        FnHandler::new("broken", |_message| async {
            HandlerResult::Err(HandlerError::new("boom"))
        }),
    );

    bus.publish(start_message(&bus))
        .await
        .expect("publish should succeed");

    assert_eq!(observed.load(Ordering::SeqCst), 1);
    let recorded = bus.history(HistoryFilter::default().of_type(MessageType::HandlerError));
    assert_eq!(recorded.len(), 1);
}

fn explode() -> HandlerResult {
    panic!("handler blew up")
}

#[rstest]
#[tokio::test]
async fn panicking_handler_is_isolated(bus: MessageBus) {
    let survivor = Arc::new(AtomicUsize::new(0));
    bus.subscribe(
        MessageType::AgentStart,
        FnHandler::new("panicky", |_message| async { explode() }),
    );
    bus.subscribe(
        MessageType::AgentStart,
        counting_handler("survivor", &survivor, false),
    );

    let report = bus
        .publish(start_message(&bus))
        .await
        .expect("publish should succeed despite panic");

    assert_eq!(survivor.load(Ordering::SeqCst), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(bus.stats().handler_failures, 1);
}

#[rstest]
#[tokio::test]
async fn can_handle_filters_messages(bus: MessageBus) {
    let counter = Arc::new(AtomicUsize::new(0));
    let wanted = AgentType::new("pricing").expect("valid agent type");
    let target = wanted.clone();
    bus.subscribe(
        MessageType::AgentStart,
        counting_handler("pricing_only", &counter, false)
            .with_filter(move |message| message.payload().agent_type() == Some(&target)),
    );

    bus.publish(start_message(&bus))
        .await
        .expect("publish should succeed");
    bus.publish(bus.message(MessagePayload::AgentStart {
        evaluation_id: EvaluationId::new(),
        agent_type: wanted,
    }))
    .await
    .expect("publish should succeed");

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn unsubscribe_stops_delivery_and_is_idempotent(bus: MessageBus) {
    let counter = Arc::new(AtomicUsize::new(0));
    let subscription = bus.subscribe(
        MessageType::AgentStart,
        counting_handler("temporary", &counter, false),
    );

    assert!(bus.unsubscribe(&subscription));
    assert!(!bus.unsubscribe(&subscription));
    assert!(!subscription.unsubscribe());

    let report = bus
        .publish(start_message(&bus))
        .await
        .expect("publish should succeed");
    assert_eq!(report.handlers_invoked, 0);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[rstest]
#[tokio::test]
async fn history_keeps_most_recent_thousand(bus: MessageBus) {
    let mut published = Vec::new();
    for _ in 0..1200 {
        let message = start_message(&bus);
        published.push(message.id());
        bus.publish(message).await.expect("publish should succeed");
    }

    let history = bus.history(HistoryFilter::default());

    assert_eq!(history.len(), 1000);
    assert_eq!(history.first().map(Message::id), published.get(200).copied());
    assert_eq!(history.last().map(Message::id), published.last().copied());
}

#[rstest]
#[tokio::test]
async fn history_filter_applies_limit_to_most_recent(bus: MessageBus) {
    for _ in 0..5 {
        bus.publish(start_message(&bus))
            .await
            .expect("publish should succeed");
    }

    let latest = bus.history(HistoryFilter::default().limit(2));
    let all = bus.history(HistoryFilter::default());

    assert_eq!(latest.len(), 2);
    assert_eq!(latest.last(), all.last());
}

#[rstest]
#[tokio::test]
async fn publish_after_shutdown_fails(bus: MessageBus) {
    bus.shutdown();

    let result = bus.publish(start_message(&bus)).await;

    assert_eq!(result, Err(BusError::ShutDown));
    assert_eq!(bus.subscription_count(), 0);
}
