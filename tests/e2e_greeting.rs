//! Scenario: small talk with no tool involved. The classifier should not
//! expose any tool schemas to the model, and the whole turn should
//! complete in a single LLM round trip.

mod support;

use support::{HarnessBuilder, EchoTool};
use std::sync::Arc;

#[tokio::test]
async fn greeting_completes_in_one_call_with_no_tool_schemas() {
    let harness = HarnessBuilder::new()
        .tool(Arc::new(EchoTool))
        .replies(vec![r#"{"final_answer": "Hello! I'm doing well, thanks for asking."}"#])
        .build();

    let response = harness.orchestrator.handle_query("hello", None).await.unwrap();

    assert!(!response.answer.is_empty());
    assert!(response.answer.contains("Hello"));
    assert_eq!(response.iterations, 0);
    assert_eq!(response.tool_calls_made, 0);

    assert_eq!(harness.provider.calls(), 1);
    let requests = harness.provider.requests();
    assert!(requests[0].tools.is_empty(), "small talk should not see tool schemas");
}
