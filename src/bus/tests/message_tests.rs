//! Unit tests for message construction and the message catalogue.

use crate::bus::domain::{
    BusHealthStatus, CorrelationId, Message, MessagePayload, MessageType, ParseMessageTypeError,
};
use crate::ids::EvaluationId;
use crate::scheduler::domain::AgentType;
use mockable::DefaultClock;
use rstest::rstest;
use serde_json::json;

fn agent(name: &str) -> AgentType {
    AgentType::new(name).expect("valid agent type")
}

#[rstest]
fn message_type_is_derived_from_payload() {
    let message = Message::new(
        MessagePayload::AgentStart {
            evaluation_id: EvaluationId::new(),
            agent_type: agent("market_research"),
        },
        &DefaultClock,
    );

    assert_eq!(message.message_type(), MessageType::AgentStart);
    assert!(message.correlation_id().is_none());
    assert!(message.reply_to().is_none());
}

#[rstest]
fn reply_targets_request_correlation_id() {
    let correlation_id = CorrelationId::new();
    let request = Message::new(
        MessagePayload::Request {
            topic: "ping".to_owned(),
            body: json!({}),
        },
        &DefaultClock,
    )
    .with_correlation_id(correlation_id);

    let reply = Message::reply(
        &request,
        MessagePayload::Reply {
            body: json!("pong"),
        },
        &DefaultClock,
    );

    assert_eq!(reply.reply_to(), Some(correlation_id));
    assert_eq!(reply.message_type(), MessageType::Reply);
}

#[rstest]
#[case("agent-progress", MessageType::AgentProgress)]
#[case("EVALUATION_COMPLETE", MessageType::EvaluationComplete)]
#[case(" handler-error ", MessageType::HandlerError)]
fn message_type_parses_wire_names(#[case] raw: &str, #[case] expected: MessageType) {
    assert_eq!(MessageType::try_from(raw), Ok(expected));
}

#[rstest]
fn unknown_message_type_is_rejected() {
    assert_eq!(
        MessageType::try_from("agent-dance"),
        Err(ParseMessageTypeError("agent-dance".to_owned()))
    );
}

#[rstest]
fn payload_serializes_with_kebab_case_tag() {
    let evaluation_id = EvaluationId::new();
    let payload = MessagePayload::AgentProgress {
        evaluation_id,
        agent_type: agent("competitive_analysis"),
        percentage: 40,
        note: None,
    };

    let value = serde_json::to_value(&payload).expect("payload serializes");

    assert_eq!(value["type"], "agent-progress");
    assert_eq!(value["agent_type"], "competitive_analysis");
    assert_eq!(payload.evaluation_id(), Some(evaluation_id));
}

#[rstest]
#[case(0, BusHealthStatus::Healthy)]
#[case(99, BusHealthStatus::Healthy)]
#[case(100, BusHealthStatus::Degraded)]
#[case(499, BusHealthStatus::Degraded)]
#[case(500, BusHealthStatus::Unhealthy)]
fn health_classification_uses_thresholds(#[case] pending: usize, #[case] expected: BusHealthStatus) {
    assert_eq!(BusHealthStatus::classify(pending, 100, 500), expected);
}
