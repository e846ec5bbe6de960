//! Tool registry: name -> [`Tool`] lookup, schema introspection, and the
//! single call path every component goes through to invoke a tool, which
//! is also where the circuit breaker and timeout live.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{instrument, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::ToolError;

use super::result::{ToolResult, ToolResultBuilder, ToolStatus};
use super::traits::Tool;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    breaker: Arc<CircuitBreaker>,
    default_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(breaker: Arc<CircuitBreaker>, default_timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            breaker,
            default_timeout,
        }
    }

    /// Registers `tool`, failing if a tool with the same name is already
    /// registered rather than silently overwriting it.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters_schema: tool.parameters_schema(),
            })
            .collect()
    }

    /// Names whose breakers are currently `Closed` or `HalfOpen` — i.e.
    /// calling them right now wouldn't be immediately short-circuited.
    /// `HalfOpen` is included per spec's "Closed or HalfOpen-probable":
    /// a half-open breaker still allows the next call through as a probe.
    pub fn available(&self) -> Vec<String> {
        self.tools
            .keys()
            .filter(|name| !matches!(self.breaker.state_of(name), crate::circuit_breaker::CircuitState::Open))
            .cloned()
            .collect()
    }

    /// Forces a named tool's breaker back to `Closed`, e.g. after an
    /// operator confirms the downstream dependency has recovered.
    pub fn reset_breaker(&self, name: &str) {
        self.breaker.reset(name);
    }

    /// Invokes `name` with `args`, enforcing the circuit breaker and a
    /// timeout. This is the only path to calling a tool; the workflow
    /// engine and delegation manager both route through it.
    #[instrument(skip(self, args), fields(tool = %name))]
    pub async fn call(&self, name: &str, args: Value) -> Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        if !self.breaker.is_available(name) {
            return Err(ToolError::CircuitOpen(name.to_string()));
        }

        if let Err(reason) = tool.validate_args(&args) {
            self.breaker.record_failure(name, true);
            return Err(ToolError::InvalidArguments {
                tool: name.to_string(),
                reason,
            });
        }

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.default_timeout, tool.call(args)).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(result)) => {
                match result.status {
                    ToolStatus::Success => self.breaker.record_success(name),
                    ToolStatus::Error | ToolStatus::Timeout => {
                        self.breaker.record_failure(name, false)
                    }
                }
                Ok(result)
            }
            Ok(Err(reason)) => {
                self.breaker.record_failure(name, false);
                warn!(tool = %name, %reason, "tool call returned an error");
                Err(ToolError::Failed {
                    tool: name.to_string(),
                    reason,
                })
            }
            Err(_) => {
                self.breaker.record_failure(name, false);
                Err(ToolError::Timeout {
                    tool: name.to_string(),
                    elapsed_ms,
                })
            }
        }
    }

    /// Like [`Self::call`], but never returns `Err` — failures and
    /// timeouts are folded into a [`ToolResult`] so workflow loops can feed
    /// them straight back to the model without a separate error path.
    pub async fn call_tolerant(&self, name: &str, args: Value) -> ToolResult {
        let start = Instant::now();
        match self.call(name, args).await {
            Ok(result) => result,
            Err(ToolError::Timeout { elapsed_ms, .. }) => ToolResultBuilder::timeout(elapsed_ms),
            Err(err) => {
                ToolResultBuilder::error(err.to_string(), start.elapsed().as_millis() as u64)
            }
        }
    }
}
