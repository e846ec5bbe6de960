//! Durable checkpoint store (C3): the workflow engine persists its state
//! after every node so a crash mid-run can be recovered rather than
//! silently dropped.
//!
//! Backed by `sled`. Two trees: `checkpoints`, keyed by
//! `thread_id || big-endian checkpoint_id`, holding the versioned
//! envelope; and `thread_status`, keyed by `thread_id`, holding the
//! latest [`ThreadStatus`] and the newest `checkpoint_id` for fast
//! recovery scans that don't need to range-scan every checkpoint.

mod store;

pub use store::CheckpointStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ENVELOPE_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Active,
    Complete,
    Incomplete,
}

/// A single persisted snapshot of a thread's workflow state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u8,
    pub thread_id: String,
    pub checkpoint_id: u64,
    pub parent_checkpoint_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub thread_status: ThreadStatus,
    /// Opaque to the store: the workflow engine's serialized `WorkflowState`.
    pub state: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub latest_checkpoint_id: u64,
    pub thread_status: ThreadStatus,
    pub updated_at: DateTime<Utc>,
}

pub fn new_thread_id() -> String {
    Uuid::new_v4().to_string()
}
