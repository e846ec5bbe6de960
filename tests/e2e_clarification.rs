//! Scenario: clarification short-circuit. An intent with a required slot
//! that the query doesn't resolve short-circuits the turn with the
//! configured clarifying question, touching neither the model nor any
//! tool.

mod support;

use agent_orchestration_core::config::{IntentSpec, RoutingConfig, SlotSpec};
use support::HarnessBuilder;

#[tokio::test]
async fn a_missing_required_slot_returns_the_clarifying_question_verbatim() {
    let routing = RoutingConfig {
        intents: vec![IntentSpec {
            name: "leave_time".to_string(),
            keywords: vec!["leave".to_string()],
            regexes: Vec::new(),
            slots: vec![SlotSpec {
                name: "destination".to_string(),
                regexes: vec![r"(?i)to ([a-z\s]+)".to_string()],
                clarifying_question: "Where are you headed?".to_string(),
            }],
        }],
        ..RoutingConfig::default()
    };

    let harness = HarnessBuilder::new()
        .routing(routing)
        .replies(vec![r#"{"final_answer": "should never be reached"}"#])
        .build();

    let response = harness
        .orchestrator
        .handle_query("when should I leave?", None)
        .await
        .unwrap();

    assert_eq!(response.answer, "Where are you headed?");
    assert_eq!(response.iterations, 0);
    assert_eq!(response.tool_calls_made, 0);
    assert_eq!(harness.provider.calls(), 0, "clarification must short-circuit before any provider call");
}
