//! Provider backed by a local subprocess speaking newline-delimited JSON
//! over stdio, for model runtimes that run on the same host (e.g. a
//! locally hosted model server launched as a child process).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::error::ProviderError;

use super::traits::{CompletionRequest, CompletionResponse, LLMProvider, Role};

struct ChildProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

pub struct LocalRpcProvider {
    name: String,
    tier: String,
    model: String,
    proc: Arc<Mutex<ChildProcess>>,
}

impl LocalRpcProvider {
    pub fn spawn(
        name: impl Into<String>,
        tier: impl Into<String>,
        model: impl Into<String>,
        command: &str,
        args: &[&str],
    ) -> Result<Self, ProviderError> {
        let name = name.into();
        let mut child = Command::new(command)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|err| ProviderError::RequestFailed {
                provider: name.clone(),
                reason: format!("failed to spawn local rpc process: {err}"),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| ProviderError::RequestFailed {
            provider: name.clone(),
            reason: "child process has no stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| ProviderError::RequestFailed {
            provider: name.clone(),
            reason: "child process has no stdout".to_string(),
        })?;

        Ok(Self {
            name,
            tier: tier.into(),
            model: model.into(),
            proc: Arc::new(Mutex::new(ChildProcess {
                child,
                stdin,
                stdout: BufReader::new(stdout),
            })),
        })
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[async_trait]
impl LLMProvider for LocalRpcProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn tier(&self) -> &str {
        &self.tier
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let mut proc = self.proc.lock().await;

        if let Ok(Some(status)) = proc.child.try_wait() {
            return Err(ProviderError::RequestFailed {
                provider: self.name.clone(),
                reason: format!("local rpc process exited with {status}"),
            });
        }

        let payload = json!({
            "model": self.model,
            "messages": request.messages.iter().map(|m| json!({
                "role": role_str(m.role),
                "content": m.content,
            })).collect::<Vec<_>>(),
            "temperature": request.temperature,
        });
        let mut line = serde_json::to_string(&payload).map_err(|err| ProviderError::RequestFailed {
            provider: self.name.clone(),
            reason: err.to_string(),
        })?;
        line.push('\n');

        proc.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|err| ProviderError::RequestFailed {
                provider: self.name.clone(),
                reason: format!("failed writing to child stdin: {err}"),
            })?;
        proc.stdin.flush().await.map_err(|err| ProviderError::RequestFailed {
            provider: self.name.clone(),
            reason: format!("failed flushing child stdin: {err}"),
        })?;

        let mut response_line = String::new();
        let bytes_read = proc
            .stdout
            .read_line(&mut response_line)
            .await
            .map_err(|err| ProviderError::RequestFailed {
                provider: self.name.clone(),
                reason: format!("failed reading from child stdout: {err}"),
            })?;
        if bytes_read == 0 {
            return Err(ProviderError::RequestFailed {
                provider: self.name.clone(),
                reason: "child process closed stdout".to_string(),
            });
        }

        let parsed: serde_json::Value =
            serde_json::from_str(response_line.trim()).map_err(|err| ProviderError::MalformedResponse {
                provider: self.name.clone(),
                reason: err.to_string(),
            })?;

        let content = parsed["content"]
            .as_str()
            .ok_or_else(|| ProviderError::MalformedResponse {
                provider: self.name.clone(),
                reason: "response missing 'content' field".to_string(),
            })?
            .to_string();

        Ok(CompletionResponse {
            content,
            model: self.model.clone(),
            prompt_tokens: parsed["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: parsed["completion_tokens"].as_u64().unwrap_or(0) as u32,
        })
    }
}
