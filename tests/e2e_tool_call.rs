//! Scenario: arithmetic via tool. The model asks for the calculator, the
//! registry runs it, and the model synthesizes the final answer from the
//! tool result on its second turn.

mod support;

use support::{CalculatorTool, HarnessBuilder};
use std::sync::Arc;

#[tokio::test]
async fn arithmetic_query_round_trips_through_the_tool_once() {
    let harness = HarnessBuilder::new()
        .tool(Arc::new(CalculatorTool))
        .replies(vec![
            r#"{"tool_calls": [{"name": "calculator", "args": {"a": 17, "b": 23, "op": "multiply"}}]}"#,
            r#"{"final_answer": "17 * 23 is 391."}"#,
        ])
        .build();

    let response = harness
        .orchestrator
        .handle_query("what is 17 * 23?", None)
        .await
        .unwrap();

    assert!(response.answer.contains("391"));
    assert_eq!(response.tool_calls_made, 1);
    assert_eq!(response.iterations, 1);

    assert_eq!(harness.provider.calls(), 2);
    let requests = harness.provider.requests();
    assert!(
        !requests[0].tools.is_empty(),
        "a query requiring a tool should see tool schemas on the first call"
    );
    assert!(requests[1]
        .messages
        .iter()
        .any(|m| m.content.contains("\"result\":391")));
}
