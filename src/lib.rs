//! Agent orchestration core: intent classification, a stateful
//! tool-calling workflow engine, multi-tier task delegation, and
//! crash-recoverable checkpointing, fronted by an HTTP API.
//!
//! See [`orchestrator::Orchestrator`] for the composition root.

pub mod checkpoint;
pub mod circuit_breaker;
pub mod cli;
pub mod config;
pub mod delegation;
pub mod error;
pub mod intent;
pub mod orchestrator;
pub mod provider;
pub mod recovery;
pub mod telemetry;
pub mod tools;
pub mod workflow;

pub use error::OrchestratorError;
pub use orchestrator::Orchestrator;
