//! The uniform envelope every tool call returns through the registry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    /// Machine-readable payload, passed back into the workflow's message
    /// history as a tool message.
    pub content: Value,
    /// Human-readable summary the LLM and operators can scan without
    /// parsing `content`.
    pub summary: Option<String>,
    pub duration_ms: u64,
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// Fluent builder for [`ToolResult`], mirroring the dual-channel
/// content/summary split tool implementations need without each one
/// hand-assembling the envelope.
#[derive(Debug, Default)]
pub struct ToolResultBuilder {
    status: Option<ToolStatus>,
    content: Option<Value>,
    summary: Option<String>,
    duration_ms: u64,
}

impl ToolResultBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: ToolStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn content(mut self, content: Value) -> Self {
        self.content = Some(content);
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn build(self) -> ToolResult {
        ToolResult {
            status: self.status.unwrap_or(ToolStatus::Success),
            content: self.content.unwrap_or(Value::Null),
            summary: self.summary,
            duration_ms: self.duration_ms,
        }
    }

    pub fn success(content: Value, duration_ms: u64) -> ToolResult {
        ToolResultBuilder::new()
            .status(ToolStatus::Success)
            .content(content)
            .duration_ms(duration_ms)
            .build()
    }

    pub fn error(reason: impl Into<String>, duration_ms: u64) -> ToolResult {
        let reason = reason.into();
        ToolResultBuilder::new()
            .status(ToolStatus::Error)
            .content(serde_json::json!({ "error": reason.clone() }))
            .summary(reason)
            .duration_ms(duration_ms)
            .build()
    }

    pub fn timeout(elapsed_ms: u64) -> ToolResult {
        ToolResultBuilder::new()
            .status(ToolStatus::Timeout)
            .content(serde_json::json!({ "error": "timed out" }))
            .summary("tool call timed out")
            .duration_ms(elapsed_ms)
            .build()
    }
}
