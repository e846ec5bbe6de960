use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashSet;
use tracing::{debug, info};

use crate::error::CheckpointError;

use super::{Checkpoint, ThreadStatus, ThreadSummary, ENVELOPE_VERSION};

/// Guards single-writer-per-thread access. Held for the duration of a
/// `put`; dropped automatically when the call returns.
struct WriterGuard {
    locks: Arc<DashSet<String>>,
    thread_id: String,
}

impl Drop for WriterGuard {
    fn drop(&mut self) {
        self.locks.remove(&self.thread_id);
    }
}

pub struct CheckpointStore {
    db: sled::Db,
    checkpoints: sled::Tree,
    thread_status: sled::Tree,
    write_locks: Arc<DashSet<String>>,
    flush_every_write: bool,
}

fn checkpoint_key(thread_id: &str, checkpoint_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(thread_id.len() + 1 + 8);
    key.extend_from_slice(thread_id.as_bytes());
    key.push(0);
    key.extend_from_slice(&checkpoint_id.to_be_bytes());
    key
}

fn thread_prefix(thread_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(thread_id.len() + 1);
    key.extend_from_slice(thread_id.as_bytes());
    key.push(0);
    key
}

impl CheckpointStore {
    pub fn open(path: impl AsRef<Path>, flush_every_write: bool) -> Result<Self, CheckpointError> {
        let db = sled::open(path)?;
        let checkpoints = db.open_tree("checkpoints")?;
        let thread_status = db.open_tree("thread_status")?;
        Ok(Self {
            db,
            checkpoints,
            thread_status,
            write_locks: Arc::new(DashSet::new()),
            flush_every_write,
        })
    }

    fn acquire_writer(&self, thread_id: &str) -> Result<WriterGuard, CheckpointError> {
        if !self.write_locks.insert(thread_id.to_string()) {
            return Err(CheckpointError::WriterConflict(thread_id.to_string()));
        }
        Ok(WriterGuard {
            locks: self.write_locks.clone(),
            thread_id: thread_id.to_string(),
        })
    }

    /// Persists a new checkpoint for `thread_id`. `checkpoint_id` is
    /// allocated monotonically by the store itself (one more than the
    /// latest known for this thread).
    pub fn put(
        &self,
        thread_id: &str,
        state: serde_json::Value,
        thread_status: ThreadStatus,
    ) -> Result<Checkpoint, CheckpointError> {
        let _guard = self.acquire_writer(thread_id)?;

        let latest = self.latest_internal(thread_id)?;
        let checkpoint_id = latest.as_ref().map(|c| c.checkpoint_id + 1).unwrap_or(1);
        let parent_checkpoint_id = latest.map(|c| c.checkpoint_id);

        let checkpoint = Checkpoint {
            version: ENVELOPE_VERSION,
            thread_id: thread_id.to_string(),
            checkpoint_id,
            parent_checkpoint_id,
            created_at: Utc::now(),
            thread_status,
            state,
        };

        let bytes = serde_json::to_vec(&checkpoint)?;
        self.checkpoints
            .insert(checkpoint_key(thread_id, checkpoint_id), bytes)?;

        let summary = ThreadSummary {
            thread_id: thread_id.to_string(),
            latest_checkpoint_id: checkpoint_id,
            thread_status,
            updated_at: checkpoint.created_at,
        };
        self.thread_status
            .insert(thread_id.as_bytes(), serde_json::to_vec(&summary)?)?;

        if self.flush_every_write {
            self.checkpoints.flush()?;
            self.thread_status.flush()?;
        }

        debug!(thread_id, checkpoint_id, ?thread_status, "persisted checkpoint");
        Ok(checkpoint)
    }

    /// Updates a thread's status without writing a new checkpoint body.
    /// Used at the start and end of a turn (even turns the workflow engine
    /// never runs, such as a clarification short-circuit or a delegated
    /// direct answer) so `incomplete_threads` always reflects reality.
    pub fn mark_thread(&self, thread_id: &str, status: ThreadStatus) -> Result<(), CheckpointError> {
        let latest_checkpoint_id = self
            .latest_internal(thread_id)?
            .map(|c| c.checkpoint_id)
            .unwrap_or(0);
        let summary = ThreadSummary {
            thread_id: thread_id.to_string(),
            latest_checkpoint_id,
            thread_status: status,
            updated_at: Utc::now(),
        };
        self.thread_status
            .insert(thread_id.as_bytes(), serde_json::to_vec(&summary)?)?;
        if self.flush_every_write {
            self.thread_status.flush()?;
        }
        Ok(())
    }

    fn decode(bytes: sled::IVec) -> Result<Checkpoint, CheckpointError> {
        let checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
        if checkpoint.version != ENVELOPE_VERSION {
            return Err(CheckpointError::UnknownVersion(
                checkpoint.thread_id,
                checkpoint.version,
            ));
        }
        Ok(checkpoint)
    }

    fn latest_internal(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let prefix = thread_prefix(thread_id);
        let last = self
            .checkpoints
            .scan_prefix(&prefix)
            .last()
            .transpose()?;
        last.map(|(_, v)| Self::decode(v)).transpose()
    }

    pub fn latest(&self, thread_id: &str) -> Result<Checkpoint, CheckpointError> {
        self.latest_internal(thread_id)?
            .ok_or_else(|| CheckpointError::NotFound(thread_id.to_string()))
    }

    pub fn get(&self, thread_id: &str, checkpoint_id: u64) -> Result<Checkpoint, CheckpointError> {
        let bytes = self
            .checkpoints
            .get(checkpoint_key(thread_id, checkpoint_id))?
            .ok_or_else(|| CheckpointError::NotFound(thread_id.to_string()))?;
        Self::decode(bytes)
    }

    pub fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
        let prefix = thread_prefix(thread_id);
        self.checkpoints
            .scan_prefix(&prefix)
            .map(|entry| entry.map_err(CheckpointError::from).and_then(|(_, v)| Self::decode(v)))
            .collect()
    }

    pub fn list_threads(&self) -> Result<Vec<ThreadSummary>, CheckpointError> {
        self.thread_status
            .iter()
            .map(|entry| {
                entry
                    .map_err(CheckpointError::from)
                    .and_then(|(_, v)| Ok(serde_json::from_slice::<ThreadSummary>(&v)?))
            })
            .collect()
    }

    /// Threads marked `Incomplete` whose last update is at least
    /// `older_than` in the past. The age gate excludes a request that is
    /// merely mid-flight right now (its turn marks `Incomplete` for the
    /// whole duration) from being mistaken for a crashed thread.
    pub fn incomplete_threads(&self, older_than: Duration) -> Result<Vec<ThreadSummary>, CheckpointError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or_default();
        Ok(self
            .list_threads()?
            .into_iter()
            .filter(|t| t.thread_status == ThreadStatus::Incomplete && t.updated_at < cutoff)
            .collect())
    }

    pub fn delete_thread(&self, thread_id: &str) -> Result<(), CheckpointError> {
        let prefix = thread_prefix(thread_id);
        let keys: Vec<_> = self
            .checkpoints
            .scan_prefix(&prefix)
            .keys()
            .collect::<Result<_, _>>()?;
        for key in keys {
            self.checkpoints.remove(key)?;
        }
        self.thread_status.remove(thread_id.as_bytes())?;
        Ok(())
    }

    /// Deletes threads whose last update is older than `max_age` and whose
    /// status is `Complete` (incomplete threads are left for the recovery
    /// manager to triage). Returns the number of threads removed.
    pub fn cleanup_older_than(&self, max_age: Duration) -> Result<u64, CheckpointError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();
        let mut removed = 0;
        for thread in self.list_threads()? {
            if thread.thread_status == ThreadStatus::Complete && thread.updated_at < cutoff {
                self.delete_thread(&thread.thread_id)?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "cleaned up expired checkpoints");
        }
        Ok(removed)
    }

    pub fn database_size_bytes(&self) -> Result<u64, CheckpointError> {
        Ok(self.db.size_on_disk()?)
    }

    pub fn vacuum(&self) -> Result<(), CheckpointError> {
        self.db.flush()?;
        Ok(())
    }
}
