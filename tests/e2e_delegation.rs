//! Scenario: delegation decompose. A multi-step query gets split into
//! dependency-ordered subtasks and dispatched across a two-tier pool; the
//! aggregated, verified answer carries every subtask's contribution.

mod support;

use agent_orchestration_core::config::DelegationConfig;
use agent_orchestration_core::delegation::{DelegationManager, Strategy};
use agent_orchestration_core::provider::{ClientPool, LLMProvider};
use support::RecordingProvider;
use std::sync::Arc;

#[tokio::test]
async fn a_multi_step_query_decomposes_dispatches_and_aggregates() {
    // Both tiers carry the same scripted script so the outcome doesn't
    // depend on which one the manager happens to treat as the default.
    let replies = vec![
        "Document summary: the document discusses quarterly revenue trends.",
        "Average computed: 42",
        "Combined both results into one answer.",
        r#"{"passed": true}"#,
    ];
    let fast = Arc::new(RecordingProvider::new("fast", replies.clone()));
    let capable = Arc::new(RecordingProvider::new("capable", replies));
    let pool = Arc::new(ClientPool::new(vec![
        fast.clone() as Arc<dyn LLMProvider>,
        capable.clone() as Arc<dyn LLMProvider>,
    ]));

    let manager = DelegationManager::new(pool, DelegationConfig::default());

    let query = "1. summarize the attached document\n\
                 2. then compute the average of the numbers in it\n\
                 3. finally combine both results";

    assert_eq!(manager.choose_strategy(query), Strategy::Decompose);

    let result = manager.run(query).await.unwrap();

    assert_eq!(result.strategy, Strategy::Decompose);
    assert!(result.outcomes.len() >= 2);
    assert!(result.outcomes.iter().any(|o| !o.subtask.depends_on.is_empty()));
    assert!(result.outcomes.iter().all(|o| o.error.is_none()));

    assert!(result.aggregated_answer.contains("summary"));
    assert!(result.aggregated_answer.contains("42"));
    assert_eq!(result.verified, Some(true));
}
