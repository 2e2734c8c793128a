//! Unit tests for scheduler domain values.

use crate::scheduler::domain::{
    AgentCapabilities, AgentHealthSnapshot, AgentHealthStatus, AgentType, SchedulerDomainError,
};
use chrono::Utc;
use rstest::rstest;

#[rstest]
#[case("market_research", "market_research")]
#[case("  Financial-Analysis ", "financial_analysis")]
#[case("risk2", "risk2")]
fn agent_type_normalizes_valid_values(#[case] raw: &str, #[case] expected: &str) {
    let agent_type = AgentType::new(raw).expect("agent type should be valid");
    assert_eq!(agent_type.as_str(), expected);
}

#[rstest]
#[case("", SchedulerDomainError::EmptyAgentType)]
#[case("   ", SchedulerDomainError::EmptyAgentType)]
#[case("market research", SchedulerDomainError::InvalidAgentType("market research".to_owned()))]
#[case("risk!", SchedulerDomainError::InvalidAgentType("risk!".to_owned()))]
fn agent_type_rejects_invalid_values(#[case] raw: &str, #[case] expected: SchedulerDomainError) {
    assert_eq!(AgentType::new(raw), Err(expected));
}

#[rstest]
fn agent_type_rejects_overlong_values() {
    let raw = "a".repeat(65);
    assert_eq!(
        AgentType::new(raw.clone()),
        Err(SchedulerDomainError::AgentTypeTooLong(raw))
    );
}

#[rstest]
fn agent_type_deserialization_validates() {
    let parsed: Result<AgentType, _> = serde_json::from_str("\"not valid\"");
    assert!(parsed.is_err());

    let valid: AgentType = serde_json::from_str("\"competitor_analysis\"").expect("valid json");
    assert_eq!(valid.as_str(), "competitor_analysis");
}

#[rstest]
fn capabilities_drop_duplicate_dependencies() {
    let market = AgentType::new("market_research").expect("valid agent type");
    let capabilities = AgentCapabilities::new()
        .providing(["market_size"])
        .depending_on([market.clone(), market.clone()]);

    assert_eq!(capabilities.dependencies(), &[market]);
    assert!(capabilities.provides_capability("market_size"));
    assert!(!capabilities.provides_capability("pricing"));
}

#[rstest]
#[case("healthy", AgentHealthStatus::Healthy)]
#[case("DEGRADED", AgentHealthStatus::Degraded)]
#[case(" error ", AgentHealthStatus::Error)]
#[case("unknown", AgentHealthStatus::Unknown)]
fn health_status_parses_known_values(#[case] raw: &str, #[case] expected: AgentHealthStatus) {
    assert_eq!(AgentHealthStatus::try_from(raw), Ok(expected));
}

#[rstest]
fn health_status_availability() {
    assert!(AgentHealthStatus::Unknown.is_available());
    assert!(AgentHealthStatus::Degraded.is_available());
    assert!(!AgentHealthStatus::Error.is_available());
    assert!(AgentHealthStatus::try_from("sleepy").is_err());
}

#[rstest]
fn health_snapshot_ignores_blank_details() {
    let snapshot = AgentHealthSnapshot::new(AgentHealthStatus::Healthy, Utc::now())
        .with_version("  ")
        .with_message("");
    assert_eq!(snapshot.version(), None);
    assert_eq!(snapshot.message(), None);
}
