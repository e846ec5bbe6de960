//! Crash recovery (C9): scans for threads left `Incomplete` by a crash
//! mid-workflow and marks them terminally failed once they've exhausted
//! their retry budget, rather than replaying them.
//!
//! Deliberately "mark-and-move-on", not "resume-and-replay": a checkpoint
//! captures the state *before* the node that was running when the process
//! died, and replaying that node against external tools/providers with
//! unknown side effects is not safe to do blindly. Recovery's job is to
//! stop a thread from being silently lost, not to guarantee it finishes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointStore, ThreadStatus, ThreadSummary};
use crate::error::CheckpointError;

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub scanned: usize,
    pub recovered: Vec<String>,
    pub exhausted: Vec<String>,
    pub attempts: HashMap<String, u32>,
}

/// Tracks recovery attempts per thread in memory. Attempts reset when the
/// process restarts; a thread that keeps crashing across restarts will
/// eventually exceed `max_recovery_attempts` within a single process's
/// uptime, which is the same bound the window this guards against (a
/// thread stuck in a crash loop) cares about.
pub struct RecoveryManager {
    store: Arc<CheckpointStore>,
    max_recovery_attempts: u32,
    min_incomplete_age: Duration,
    attempts: Mutex<HashMap<String, u32>>,
}

impl RecoveryManager {
    pub fn new(store: Arc<CheckpointStore>, max_recovery_attempts: u32, min_incomplete_age: Duration) -> Self {
        Self {
            store,
            max_recovery_attempts,
            min_incomplete_age,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Candidates that have sat `Incomplete` for at least
    /// `min_incomplete_age` — recent enough and this is still someone
    /// else's in-flight request, not a crash.
    pub fn scan_for_crashed_threads(&self) -> Result<Vec<ThreadSummary>, CheckpointError> {
        self.store.incomplete_threads(self.min_incomplete_age)
    }

    pub fn can_recover_thread(&self, thread_id: &str) -> bool {
        let attempts = self.attempts.lock();
        attempts.get(thread_id).copied().unwrap_or(0) < self.max_recovery_attempts
    }

    fn mark_recovery_attempt(&self, thread_id: &str) -> u32 {
        let mut attempts = self.attempts.lock();
        let count = attempts.entry(thread_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Runs one recovery pass: every `Incomplete` thread either gets
    /// another attempt recorded against it (if under budget) or is marked
    /// `Complete` with an error note (if the budget is exhausted), so it
    /// stops showing up in future scans.
    pub fn run_pass(&self) -> Result<RecoveryReport, CheckpointError> {
        let crashed = self.scan_for_crashed_threads()?;
        let scanned = crashed.len();
        let mut recovered = Vec::new();
        let mut exhausted = Vec::new();

        for thread in crashed {
            if self.can_recover_thread(&thread.thread_id) {
                let attempt = self.mark_recovery_attempt(&thread.thread_id);
                info!(
                    thread_id = %thread.thread_id,
                    attempt,
                    max = self.max_recovery_attempts,
                    "recovery attempt recorded for crashed thread"
                );
                recovered.push(thread.thread_id);
            } else {
                warn!(
                    thread_id = %thread.thread_id,
                    max = self.max_recovery_attempts,
                    "thread exhausted recovery attempts, marking complete"
                );
                self.store.put(
                    &thread.thread_id,
                    serde_json::json!({
                        "error": "recovery attempts exhausted",
                        "last_checkpoint_id": thread.latest_checkpoint_id,
                    }),
                    ThreadStatus::Complete,
                )?;
                exhausted.push(thread.thread_id);
            }
        }

        let attempts = self.attempts.lock().clone();
        Ok(RecoveryReport {
            scanned,
            recovered,
            exhausted,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (RecoveryManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CheckpointStore::open(dir.path().join("db"), true).unwrap());
        (RecoveryManager::new(store, 2, Duration::ZERO), dir)
    }

    #[test]
    fn a_thread_incomplete_for_less_than_the_age_gate_is_not_scanned() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CheckpointStore::open(dir.path().join("db"), true).unwrap());
        let manager = RecoveryManager::new(store.clone(), 2, Duration::from_secs(3600));
        store
            .put("t1", serde_json::json!({}), ThreadStatus::Incomplete)
            .unwrap();
        assert!(manager.scan_for_crashed_threads().unwrap().is_empty());
    }

    #[test]
    fn scan_only_returns_incomplete_threads() {
        let (manager, _dir) = manager();
        manager
            .store
            .put("t1", serde_json::json!({}), ThreadStatus::Incomplete)
            .unwrap();
        manager
            .store
            .put("t2", serde_json::json!({}), ThreadStatus::Complete)
            .unwrap();
        let crashed = manager.scan_for_crashed_threads().unwrap();
        assert_eq!(crashed.len(), 1);
        assert_eq!(crashed[0].thread_id, "t1");
    }

    #[test]
    fn run_pass_tracks_attempts_until_exhausted() {
        let (manager, _dir) = manager();
        manager
            .store
            .put("t1", serde_json::json!({}), ThreadStatus::Incomplete)
            .unwrap();

        let first = manager.run_pass().unwrap();
        assert_eq!(first.recovered, vec!["t1".to_string()]);
        assert!(first.exhausted.is_empty());

        manager
            .store
            .put("t1", serde_json::json!({}), ThreadStatus::Incomplete)
            .unwrap();
        let second = manager.run_pass().unwrap();
        assert_eq!(second.recovered, vec!["t1".to_string()]);

        manager
            .store
            .put("t1", serde_json::json!({}), ThreadStatus::Incomplete)
            .unwrap();
        let third = manager.run_pass().unwrap();
        assert!(third.recovered.is_empty());
        assert_eq!(third.exhausted, vec!["t1".to_string()]);

        let crashed_after = manager.scan_for_crashed_threads().unwrap();
        assert!(crashed_after.is_empty());
    }
}
