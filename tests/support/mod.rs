//! Shared fixtures for the end-to-end scenario tests: a scripted provider
//! that records every request it was asked to complete, plus a couple of
//! minimal tools and a one-call `Orchestrator` builder so each scenario
//! file only has to describe what's different about it.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agent_orchestration_core::checkpoint::CheckpointStore;
use agent_orchestration_core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use agent_orchestration_core::config::{OrchestratorConfig, RoutingConfig};
use agent_orchestration_core::error::ProviderError;
use agent_orchestration_core::provider::{ClientPool, CompletionRequest, CompletionResponse, LLMProvider};
use agent_orchestration_core::telemetry::MetricsCollector;
use agent_orchestration_core::tools::{Tool, ToolRegistry, ToolResult, ToolResultBuilder};
use agent_orchestration_core::Orchestrator;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

/// Stands in for a real model: returns canned replies in order and records
/// every request it was handed, so a scenario can assert on both the
/// number of round trips and what was actually sent (e.g. whether tool
/// schemas were present).
pub struct RecordingProvider {
    tier: String,
    replies: Vec<String>,
    call_count: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl RecordingProvider {
    pub fn new(tier: impl Into<String>, replies: Vec<&str>) -> Self {
        Self {
            tier: tier.into(),
            replies: replies.into_iter().map(String::from).collect(),
            call_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LLMProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    fn tier(&self) -> &str {
        &self.tier
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);
        let content = self
            .replies
            .get(idx)
            .cloned()
            .unwrap_or_else(|| r#"{"final_answer": "done"}"#.to_string());
        Ok(CompletionResponse {
            content,
            model: "recording".to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
        })
    }
}

/// A provider that always fails, used to exercise delegation's
/// retry-on-a-different-tier path and the circuit breaker.
pub struct AlwaysFailsProvider {
    tier: String,
}

impl AlwaysFailsProvider {
    pub fn new(tier: impl Into<String>) -> Self {
        Self { tier: tier.into() }
    }
}

#[async_trait]
impl LLMProvider for AlwaysFailsProvider {
    fn name(&self) -> &str {
        "always-fails"
    }

    fn tier(&self) -> &str {
        &self.tier
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        Err(ProviderError::RequestFailed {
            provider: "always-fails".to_string(),
            reason: "simulated outage".to_string(),
        })
    }
}

/// Echoes its arguments back as the tool result content.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "echoes its input back"
    }
    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }
    async fn call(&self, args: Value) -> Result<ToolResult, String> {
        Ok(ToolResultBuilder::success(args, 1))
    }
}

/// A calculator tool that adds or multiplies `a` and `b`, selected by an
/// optional `op` argument (defaults to `"add"`).
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }
    fn description(&self) -> &str {
        "performs arithmetic on two numbers"
    }
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "a": {"type": "number"},
                "b": {"type": "number"},
                "op": {"type": "string", "enum": ["add", "multiply"]},
            },
            "required": ["a", "b"],
        })
    }
    async fn call(&self, args: Value) -> Result<ToolResult, String> {
        let a = args.get("a").and_then(Value::as_f64).ok_or("missing a")?;
        let b = args.get("b").and_then(Value::as_f64).ok_or("missing b")?;
        let op = args.get("op").and_then(Value::as_str).unwrap_or("add");
        let result = match op {
            "multiply" => a * b,
            _ => a + b,
        };
        Ok(ToolResultBuilder::success(serde_json::json!({ "result": result }), 1))
    }
}

/// A tool whose first `fail_times` calls error, after which it succeeds,
/// for exercising the tool-failure-then-recovery path.
pub struct FlakyTool {
    remaining_failures: AtomicUsize,
}

impl FlakyTool {
    pub fn new(fail_times: usize) -> Self {
        Self {
            remaining_failures: AtomicUsize::new(fail_times),
        }
    }
}

#[async_trait]
impl Tool for FlakyTool {
    fn name(&self) -> &str {
        "flaky"
    }
    fn description(&self) -> &str {
        "fails a fixed number of times, then succeeds"
    }
    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }
    async fn call(&self, _args: Value) -> Result<ToolResult, String> {
        let remaining = self.remaining_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            if n == 0 {
                None
            } else {
                Some(n - 1)
            }
        });
        match remaining {
            Ok(_) => Err("downstream dependency unavailable".to_string()),
            Err(_) => Ok(ToolResultBuilder::success(serde_json::json!({"ok": true}), 1)),
        }
    }
}

/// Everything a scenario needs to drive one `Orchestrator::handle_query`
/// call, bundled so the temp checkpoint directory stays alive for the
/// test's duration.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub provider: Arc<RecordingProvider>,
    _checkpoint_dir: tempfile::TempDir,
}

pub struct HarnessBuilder {
    routing: RoutingConfig,
    config: OrchestratorConfig,
    tools: Vec<Arc<dyn Tool>>,
    replies: Vec<&'static str>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            routing: RoutingConfig::default(),
            config: OrchestratorConfig::default(),
            tools: Vec::new(),
            replies: Vec::new(),
        }
    }

    pub fn routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn replies(mut self, replies: Vec<&'static str>) -> Self {
        self.replies = replies;
        self
    }

    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = Arc::new(CheckpointStore::open(dir.path().join("db"), true).unwrap());

        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
        let mut registry = ToolRegistry::new(breaker, std::time::Duration::from_secs(5));
        for tool in self.tools {
            registry.register(tool).unwrap();
        }

        let provider = Arc::new(RecordingProvider::new("fast", self.replies));
        let pool = Arc::new(ClientPool::new(vec![provider.clone() as Arc<dyn LLMProvider>]));

        let routing = Arc::new(ArcSwap::from_pointee(self.routing));
        let metrics = Arc::new(MetricsCollector::new());

        let orchestrator = Orchestrator::new(
            self.config,
            routing,
            Arc::new(registry),
            pool,
            checkpoints,
            metrics,
        );

        Harness {
            orchestrator,
            provider,
            _checkpoint_dir: dir,
        }
    }
}
