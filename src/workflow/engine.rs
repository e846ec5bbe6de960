//! Stateful tool-calling workflow interpreter (C6): a small typed graph of
//! `LLM -> {Tools | Validate | End}`, `Tools -> Validate`,
//! `Validate -> {LLM | End}`, bounded by `max_iterations` and persisted to
//! a [`CheckpointStore`] after every node.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::checkpoint::{CheckpointStore, ThreadStatus};
use crate::error::OrchestratorError;
use crate::provider::{CompletionRequest, LLMProvider, Message};
use crate::tools::{ToolRegistry, VectorStoreClient};

use super::compaction;
use super::json_extract::extract_json_object;
use super::state::{NextAction, ToolExecutionRecord, WorkflowBounds, WorkflowState};

#[derive(Debug, Clone, Deserialize)]
struct ToolCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ParsedAssistantReply {
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
    #[serde(default)]
    final_answer: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome {
    pub thread_id: String,
    pub final_message: String,
    pub iterations: u32,
    pub tool_calls_made: usize,
}

pub struct WorkflowEngine {
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    checkpoints: Arc<CheckpointStore>,
    bounds: WorkflowBounds,
    archive: Option<Arc<dyn VectorStoreClient>>,
}

impl WorkflowEngine {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        tools: Arc<ToolRegistry>,
        checkpoints: Arc<CheckpointStore>,
        bounds: WorkflowBounds,
    ) -> Self {
        Self {
            provider,
            tools,
            checkpoints,
            bounds,
            archive: None,
        }
    }

    /// Attaches a vector-store collaborator so compaction archives the
    /// messages it drops instead of discarding them outright.
    pub fn with_archive(mut self, archive: Arc<dyn VectorStoreClient>) -> Self {
        self.archive = Some(archive);
        self
    }

    #[instrument(skip(self, state), fields(thread_id = %state.thread_id))]
    pub async fn run(&self, mut state: WorkflowState) -> Result<WorkflowOutcome, OrchestratorError> {
        loop {
            state = match state.next_action {
                NextAction::CallLlm => self.spawn_llm_node(state).await?,
                NextAction::CallTools => self.spawn_tools_node(state).await?,
                NextAction::Validate => self.spawn_validate_node(state).await?,
                NextAction::End => break,
            };

            let status = if state.next_action == NextAction::End {
                ThreadStatus::Complete
            } else {
                ThreadStatus::Active
            };
            self.checkpoint(&state, status)?;
        }

        // Validate is the sole place retry_count is bounded against
        // max_iterations; by the time the graph reaches End with this
        // particular error text, the turn is done but unsuccessful.
        if state
            .error
            .as_deref()
            .is_some_and(|e| e.contains("max iterations"))
        {
            return Err(OrchestratorError::MaxIterationsExceeded(
                self.bounds.max_iterations,
            ));
        }

        let final_message = state
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::provider::Role::Assistant))
            .map(|m| m.content.clone())
            .unwrap_or_default();

        Ok(WorkflowOutcome {
            thread_id: state.thread_id.clone(),
            final_message,
            iterations: state.retry_count,
            tool_calls_made: state.tool_results.len(),
        })
    }

    fn checkpoint(&self, state: &WorkflowState, status: ThreadStatus) -> Result<(), OrchestratorError> {
        let serialized = serde_json::to_value(state).map_err(|err| {
            OrchestratorError::Internal(format!("failed to serialize workflow state: {err}"))
        })?;
        self.checkpoints.put(&state.thread_id, serialized, status)?;
        Ok(())
    }

    /// Runs the LLM node on a spawned task so a panic there surfaces as a
    /// `JoinError` (mapped to `OrchestratorError::Internal`) the same way a
    /// panicking parallel tool call does, rather than taking down the
    /// calling task.
    async fn spawn_llm_node(&self, mut state: WorkflowState) -> Result<WorkflowState, OrchestratorError> {
        let provider = self.provider.clone();
        let tools = self.tools.clone();
        let bounds = self.bounds;
        let archive = self.archive.clone();
        let handle = tokio::spawn(async move {
            let result =
                Self::llm_node_inner(provider.as_ref(), &tools, &bounds, archive.as_deref(), &mut state).await;
            (state, result)
        });
        let (state, result) = handle.await?;
        result?;
        Ok(state)
    }

    async fn llm_node_inner(
        provider: &dyn LLMProvider,
        tools: &ToolRegistry,
        bounds: &WorkflowBounds,
        archive: Option<&dyn VectorStoreClient>,
        state: &mut WorkflowState,
    ) -> Result<(), OrchestratorError> {
        state.iteration += 1;

        compaction::compact(provider, state, bounds, archive).await?;

        let tool_schemas = if state.tools_enabled {
            tools
                .descriptors()
                .into_iter()
                .map(|d| {
                    serde_json::json!({
                        "name": d.name,
                        "description": d.description,
                        "parameters": d.parameters_schema,
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        // Only the prompt sent to the provider is windowed; the full
        // history stays in state for checkpointing and final-answer
        // extraction. This is independent of (and runs on every call,
        // unlike) the high-water-mark summarization above.
        let window_start = state.messages.len().saturating_sub(bounds.context_window);
        let request = CompletionRequest {
            messages: state.messages[window_start..].to_vec(),
            temperature: bounds.temperature,
            tools: tool_schemas,
        };

        let response = provider.complete(request).await?;
        state.messages.push(Message::assistant(response.content.clone()));

        let extracted = extract_json_object(&response.content)
            .and_then(|json| serde_json::from_str::<ParsedAssistantReply>(json).ok());

        match extracted {
            Some(parsed) if !parsed.tool_calls.is_empty() => {
                state.metadata["pending_tool_calls"] = serde_json::to_value(&parsed.tool_calls)
                    .unwrap_or(serde_json::Value::Null);
                state.next_action = NextAction::CallTools;
            }
            Some(parsed) => {
                let answer = parsed.final_answer.unwrap_or_else(|| response.content.clone());
                state.metadata["final_answer"] = serde_json::Value::String(answer);
                state.next_action = NextAction::Validate;
            }
            None => {
                // Parse failure: fall back to the raw text as a direct
                // answer rather than hard-failing the turn.
                state.metadata["final_answer"] = serde_json::Value::String(response.content.clone());
                state.next_action = NextAction::Validate;
            }
        }
        Ok(())
    }

    async fn spawn_tools_node(&self, mut state: WorkflowState) -> Result<WorkflowState, OrchestratorError> {
        let tools = self.tools.clone();
        let max_tool_calls_per_turn = self.bounds.max_tool_calls_per_turn;
        let handle = tokio::spawn(async move {
            Self::tools_node_inner(&tools, max_tool_calls_per_turn, &mut state).await;
            state
        });
        Ok(handle.await?)
    }

    async fn tools_node_inner(tools: &ToolRegistry, max_tool_calls_per_turn: u32, state: &mut WorkflowState) {
        let pending: Vec<ToolCall> = state
            .metadata
            .get("pending_tool_calls")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let calls: Vec<ToolCall> = pending.into_iter().take(max_tool_calls_per_turn as usize).collect();

        // Each call runs concurrently against the shared registry, which
        // enforces its own per-tool breaker and timeout; results are
        // joined before the node advances, in call order, so the
        // transcript stays deterministic regardless of completion order.
        let futures = calls.iter().map(|call| async move {
            let result = tools.call_tolerant(&call.name, call.args.clone()).await;
            (call.name.clone(), call.args.clone(), result)
        });
        let results = futures::future::join_all(futures).await;

        for (name, args, result) in results {
            let formatted = format_tool_result(&name, &result);
            state.messages.push(Message::tool(formatted, name.clone()));
            state.tool_results.push(ToolExecutionRecord {
                tool: name,
                args,
                result,
            });
        }

        if let Some(map) = state.metadata.as_object_mut() {
            map.remove("pending_tool_calls");
        }
        state.next_action = NextAction::Validate;
    }

    async fn spawn_validate_node(&self, mut state: WorkflowState) -> Result<WorkflowState, OrchestratorError> {
        let max_iterations = self.bounds.max_iterations;
        let handle = tokio::spawn(async move {
            Self::validate_node_inner(&mut state, max_iterations);
            state
        });
        Ok(handle.await?)
    }

    /// Mirrors the reference decision table directly: `retry_count` (bumped
    /// only here, never by the LLM node) is the sole bound against
    /// `max_iterations`; a trailing tool message always routes back to the
    /// LLM to synthesize an answer from it; a completed answer ends the
    /// turn; anything else (a malformed reply that produced neither)
    /// retries the LLM.
    fn validate_node_inner(state: &mut WorkflowState, max_iterations: u32) {
        if state.error.is_some() {
            state.next_action = NextAction::End;
            return;
        }

        if state.retry_count >= max_iterations {
            state.error = Some(format!("max iterations ({max_iterations}) exceeded"));
            state.next_action = NextAction::End;
            return;
        }

        let last_is_tool_message = matches!(
            state.messages.last().map(|m| m.role),
            Some(crate::provider::Role::Tool)
        );

        if last_is_tool_message {
            state.retry_count += 1;
            state.next_action = NextAction::CallLlm;
            return;
        }

        let has_final_answer = state.metadata.get("final_answer").is_some();
        if has_final_answer {
            state.next_action = NextAction::End;
        } else {
            state.retry_count += 1;
            state.next_action = NextAction::CallLlm;
        }
    }
}

fn format_tool_result(tool: &str, result: &crate::tools::ToolResult) -> String {
    if let Some(summary) = &result.summary {
        format!("[{tool}] {summary}")
    } else {
        format!("[{tool}] {}", result.content)
    }
}
