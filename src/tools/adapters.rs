//! Concrete [`Tool`] implementations: an in-process closure adapter, an
//! MCP-backed adapter, and a plain HTTP adapter.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::result::{ToolResult, ToolResultBuilder};
use super::traits::Tool;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Adapts a plain async closure into a [`Tool`], for capabilities that live
/// in-process (no IPC, no network hop).
pub struct LocalFnTool<F> {
    name: String,
    description: String,
    schema: Value,
    handler: F,
}

impl<F> LocalFnTool<F>
where
    F: Fn(Value) -> BoxFuture<'static, Result<Value, String>> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value, handler: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler,
        }
    }
}

#[async_trait]
impl<F> Tool for LocalFnTool<F>
where
    F: Fn(Value) -> BoxFuture<'static, Result<Value, String>> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn call(&self, args: Value) -> Result<ToolResult, String> {
        let start = std::time::Instant::now();
        let content = (self.handler)(args).await?;
        Ok(ToolResultBuilder::success(
            content,
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// Adapts a remote tool reachable over the Model Context Protocol. Holds a
/// reference to an already-initialized client so the registry can keep one
/// live transport per MCP server instead of reconnecting per call.
pub struct McpTool {
    name: String,
    description: String,
    schema: Value,
    client: Arc<dyn McpToolClient>,
}

/// Narrow slice of an MCP client's capability this adapter needs: calling a
/// named tool with JSON arguments and getting JSON (or an error message)
/// back. Kept separate from `rmcp`'s own client type so this module and
/// its tests don't have to stand up a real transport.
#[async_trait]
pub trait McpToolClient: Send + Sync {
    async fn call_tool(&self, name: &str, args: Value) -> Result<Value, String>;
}

impl McpTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        client: Arc<dyn McpToolClient>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            client,
        }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn call(&self, args: Value) -> Result<ToolResult, String> {
        let start = std::time::Instant::now();
        let content = self.client.call_tool(&self.name, args).await?;
        Ok(ToolResultBuilder::success(
            content,
            start.elapsed().as_millis() as u64,
        ))
    }
}

/// Adapts a tool exposed over plain HTTP POST, for sidecar services that
/// don't speak MCP.
pub struct HttpTool {
    name: String,
    description: String,
    schema: Value,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        endpoint: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            endpoint: endpoint.into(),
            client,
        }
    }
}

#[async_trait]
impl Tool for HttpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn call(&self, args: Value) -> Result<ToolResult, String> {
        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .json(&args)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if !response.status().is_success() {
            return Err(format!("endpoint returned status {}", response.status()));
        }

        let content: Value = response.json().await.map_err(|err| err.to_string())?;
        Ok(ToolResultBuilder::success(
            content,
            start.elapsed().as_millis() as u64,
        ))
    }
}
