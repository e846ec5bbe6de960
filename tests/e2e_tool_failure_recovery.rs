//! Scenario: a tool fails enough times to trip its breaker mid-turn; the
//! engine keeps going, sees the breaker open on the next attempt, and
//! still produces a textual answer acknowledging the outage instead of
//! hard-failing the turn.

mod support;

use agent_orchestration_core::checkpoint::CheckpointStore;
use agent_orchestration_core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use agent_orchestration_core::tools::ToolRegistry;
use agent_orchestration_core::workflow::{WorkflowBounds, WorkflowEngine, WorkflowState};
use support::{FlakyTool, RecordingProvider};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn breaker_opens_mid_turn_and_the_turn_still_produces_an_answer() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoints = Arc::new(CheckpointStore::open(dir.path().join("db"), true).unwrap());

    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: 3,
        ..CircuitBreakerConfig::default()
    }));
    let mut registry = ToolRegistry::new(breaker, Duration::from_secs(5));
    registry.register(Arc::new(FlakyTool::new(3))).unwrap();

    let provider = Arc::new(RecordingProvider::new(
        "fast",
        vec![
            r#"{"tool_calls": [{"name": "flaky", "args": {}}]}"#,
            r#"{"tool_calls": [{"name": "flaky", "args": {}}]}"#,
            r#"{"tool_calls": [{"name": "flaky", "args": {}}]}"#,
            r#"{"tool_calls": [{"name": "flaky", "args": {}}]}"#,
            r#"{"final_answer": "The flaky service is unavailable right now, so I can't complete that part."}"#,
        ],
    ));

    let bounds = WorkflowBounds {
        max_iterations: 5,
        context_window: 20,
        temperature: 0.15,
        max_tool_calls_per_turn: 5,
        compaction_threshold: 100,
    };
    let engine = WorkflowEngine::new(provider.clone(), Arc::new(registry), checkpoints, bounds);
    let state = WorkflowState::new("t1", "c1", "do the flaky thing for me");

    let outcome = engine.run(state).await.unwrap();

    assert_eq!(provider.calls(), 5);
    assert_eq!(outcome.tool_calls_made, 4);
    assert!(outcome.iterations <= 5);
    assert!(outcome.final_message.contains("unavailable"));
}
