//! Typed error taxonomy for the orchestration core.
//!
//! Each component boundary gets its own `thiserror` enum; `anyhow::Error`
//! is reserved for the outermost HTTP/CLI boundary where callers only need
//! a message and a status code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool '{0}' is not registered")]
    NotFound(String),
    #[error("tool '{0}' is already registered")]
    AlreadyRegistered(String),
    #[error("circuit breaker open for tool '{0}'")]
    CircuitOpen(String),
    #[error("invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("tool '{tool}' timed out after {elapsed_ms}ms")]
    Timeout { tool: String, elapsed_ms: u64 },
    #[error("tool '{tool}' failed: {reason}")]
    Failed { tool: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider '{0}' is not configured")]
    NotConfigured(String),
    #[error("request to provider '{provider}' failed: {reason}")]
    RequestFailed { provider: String, reason: String },
    #[error("provider '{provider}' returned an unparsable response: {reason}")]
    MalformedResponse { provider: String, reason: String },
    #[error("provider '{provider}' rejected the request: {reason}")]
    InvalidRequest { provider: String, reason: String },
    #[error("provider '{0}' timed out")]
    Timeout(String),
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("storage backend error: {0}")]
    Storage(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("no checkpoint found for thread '{0}'")]
    NotFound(String),
    #[error("checkpoint envelope for thread '{0}' has unknown format version {1}")]
    UnknownVersion(String, u8),
    #[error("thread '{0}' is already being written by another writer")]
    WriterConflict(String),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("maximum iterations ({0}) exceeded")]
    MaxIterationsExceeded(u32),
    #[error("worker pool overloaded, rejecting request")]
    Overloaded,
    #[error("request exceeded deadline of {0:?}")]
    DeadlineExceeded(std::time::Duration),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for OrchestratorError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            OrchestratorError::Internal(format!("task panicked: {err}"))
        } else {
            OrchestratorError::Internal(format!("task cancelled: {err}"))
        }
    }
}
