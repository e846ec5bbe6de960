//! The state threaded through the workflow graph, plus the tunable knobs
//! that bound it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::provider::Message;
use crate::tools::ToolResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    CallLlm,
    CallTools,
    Validate,
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    pub tool: String,
    pub args: serde_json::Value,
    pub result: ToolResult,
}

/// The full mutable state of one workflow run. Serialized verbatim into a
/// checkpoint after every node transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    #[serde(skip, default = "Uuid::new_v4")]
    pub request_id: Uuid,
    pub thread_id: String,
    pub messages: Vec<Message>,
    pub tool_results: Vec<ToolExecutionRecord>,
    pub router_recommendation: Option<String>,
    pub next_action: NextAction,
    pub error: Option<String>,
    pub retry_count: u32,
    pub iteration: u32,
    pub conversation_id: String,
    pub user_id: Option<String>,
    /// Whether the LLM node should expose tool schemas at all this turn,
    /// per the intent classifier's cheaper "does this need tools"
    /// heuristic. Suppressing it for small talk keeps the prompt smaller
    /// and steers the model away from spurious tool calls.
    pub tools_enabled: bool,
    pub metadata: serde_json::Value,
}

impl WorkflowState {
    pub fn new(thread_id: impl Into<String>, conversation_id: impl Into<String>, query: &str) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            thread_id: thread_id.into(),
            messages: vec![Message::user(query)],
            tool_results: Vec::new(),
            router_recommendation: None,
            next_action: NextAction::CallLlm,
            error: None,
            retry_count: 0,
            iteration: 0,
            conversation_id: conversation_id.into(),
            user_id: None,
            tools_enabled: true,
            metadata: serde_json::json!({}),
        }
    }
}

/// Validated bounds for a workflow run, analogous to the original
/// system's pydantic-validated configuration model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkflowBounds {
    pub max_iterations: u32,
    pub context_window: usize,
    pub temperature: f32,
    pub max_tool_calls_per_turn: u32,
    pub compaction_threshold: usize,
}

impl From<&crate::config::WorkflowConfig> for WorkflowBounds {
    fn from(config: &crate::config::WorkflowConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            context_window: config.context_window,
            temperature: config.temperature,
            max_tool_calls_per_turn: config.max_tool_calls_per_turn,
            compaction_threshold: config.compaction_threshold,
        }
    }
}
