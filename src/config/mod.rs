//! Configuration loading: a static [`OrchestratorConfig`] read once at
//! startup, and a hot-reloadable [`RoutingConfig`] that a file watcher can
//! swap in while the server keeps serving requests.

mod routing;

pub use routing::{watch_routing_config, IntentSpec, RoutingConfig, SlotSpec, ToolPattern};

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub worker_concurrency: usize,
    pub request_deadline_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("valid default bind addr"),
            worker_concurrency: num_cpus::get().max(2),
            request_deadline_secs: 120,
        }
    }
}

impl ServerConfig {
    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub max_iterations: u32,
    pub context_window: usize,
    pub max_tool_calls_per_turn: u32,
    pub temperature: f32,
    pub compaction_threshold: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            context_window: 12,
            max_tool_calls_per_turn: 5,
            temperature: 0.15,
            compaction_threshold: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationConfig {
    pub complexity_threshold: f32,
    pub verification_threshold: f32,
    pub subtask_timeout_secs: u64,
    pub max_parallel_subtasks: usize,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: 0.6,
            verification_threshold: 0.75,
            subtask_timeout_secs: 60,
            max_parallel_subtasks: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub db_path: String,
    pub flush_every_write: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            db_path: "data/checkpoints.sled".to_string(),
            flush_every_write: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub max_recovery_attempts: u32,
    pub scan_interval_secs: u64,
    /// How long a thread must have sat `Incomplete` before a recovery pass
    /// will consider it crashed rather than merely still in flight.
    pub min_incomplete_age_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_recovery_attempts: 3,
            scan_interval_secs: 300,
            min_incomplete_age_secs: 120,
        }
    }
}

/// Top-level configuration, loaded once at process start from
/// `config.toml` (if present), then overridden by `ORCH_*` environment
/// variables, then validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub server: ServerConfig,
    pub workflow: WorkflowConfig,
    pub delegation: DelegationConfig,
    pub checkpoint: CheckpointConfig,
    pub recovery: RecoveryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub routing_config_path: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            workflow: WorkflowConfig::default(),
            delegation: DelegationConfig::default(),
            checkpoint: CheckpointConfig::default(),
            recovery: RecoveryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            routing_config_path: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ORCH_BIND_ADDR") {
            if let Ok(addr) = v.parse() {
                self.server.bind_addr = addr;
            }
        }
        if let Ok(v) = std::env::var("ORCH_WORKER_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                self.server.worker_concurrency = n;
            }
        }
        if let Ok(v) = std::env::var("ORCH_MAX_ITERATIONS") {
            if let Ok(n) = v.parse() {
                self.workflow.max_iterations = n;
            }
        }
        if let Ok(v) = std::env::var("ORCH_CHECKPOINT_DB_PATH") {
            self.checkpoint.db_path = v;
        }
        if let Ok(v) = std::env::var("ORCH_ROUTING_CONFIG_PATH") {
            self.routing_config_path = Some(v);
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            (1..=20).contains(&self.workflow.max_iterations),
            "workflow.max_iterations must be within 1..=20, got {}",
            self.workflow.max_iterations
        );
        anyhow::ensure!(
            (1..=50).contains(&self.workflow.context_window),
            "workflow.context_window must be within 1..=50, got {}",
            self.workflow.context_window
        );
        anyhow::ensure!(
            (0.0..=2.0).contains(&self.workflow.temperature),
            "workflow.temperature must be within 0.0..=2.0, got {}",
            self.workflow.temperature
        );
        anyhow::ensure!(
            (1..=10).contains(&self.workflow.max_tool_calls_per_turn),
            "workflow.max_tool_calls_per_turn must be within 1..=10, got {}",
            self.workflow.max_tool_calls_per_turn
        );
        anyhow::ensure!(
            self.server.worker_concurrency > 0,
            "server.worker_concurrency must be greater than zero"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.delegation.complexity_threshold),
            "delegation.complexity_threshold must be within 0.0..=1.0"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.delegation.verification_threshold),
            "delegation.verification_threshold must be within 0.0..=1.0"
        );
        anyhow::ensure!(
            self.recovery.max_recovery_attempts > 0,
            "recovery.max_recovery_attempts must be greater than zero"
        );
        Ok(())
    }
}
