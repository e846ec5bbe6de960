//! Collaborators this crate specifies an interface for but does not own
//! an implementation of: a code sandbox and a vector store used to
//! archive conversation turns dropped during context compaction. Each
//! trait is narrow on purpose so production can back it with a real RPC
//! client while tests use the in-memory fake shipped alongside it.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

/// Outcome of running a snippet in the sandbox, mirroring the shape of a
/// subprocess result: captured streams plus an exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecutionResult {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }
}

/// Runs untrusted code in an isolated environment. Implementations decide
/// what "isolated" means (container, microVM, remote worker); this trait
/// only specifies the request/response shape.
#[async_trait]
pub trait SandboxClient: Send + Sync {
    async fn execute(&self, language: &str, code: &str) -> Result<ExecutionResult, String>;
}

/// A document archived to the vector store, keyed for later retrieval.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub metadata: Value,
}

/// Archives and retrieves documents by similarity. The workflow engine
/// uses this to stash the original messages a compaction pass summarizes
/// away, so they remain recoverable even though they've left the live
/// context window.
#[async_trait]
pub trait VectorStoreClient: Send + Sync {
    async fn upsert(&self, collection: &str, record: VectorRecord) -> Result<(), String>;

    async fn query(&self, collection: &str, text: &str, top_k: usize) -> Result<Vec<VectorRecord>, String>;
}

/// A sandbox fake that never actually executes anything. Exists so code
/// paths that depend on `SandboxClient` are testable without standing up
/// a real execution backend.
pub struct InMemorySandbox;

#[async_trait]
impl SandboxClient for InMemorySandbox {
    async fn execute(&self, language: &str, code: &str) -> Result<ExecutionResult, String> {
        Ok(ExecutionResult::success(format!(
            "[fake {language} sandbox] received {} bytes, nothing was run",
            code.len()
        )))
    }
}

/// An in-process substitute for a real vector database: linear scan over
/// a substring match instead of embeddings. Good enough for tests, not
/// for production recall.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: Mutex<HashMap<String, Vec<VectorRecord>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStoreClient for InMemoryVectorStore {
    async fn upsert(&self, collection: &str, record: VectorRecord) -> Result<(), String> {
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn query(&self, collection: &str, text: &str, top_k: usize) -> Result<Vec<VectorRecord>, String> {
        let needle = text.to_lowercase();
        let collections = self.collections.lock();
        let matches = collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.text.to_lowercase().contains(&needle))
                    .take(top_k)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_sandbox_reports_nothing_ran() {
        let sandbox = InMemorySandbox;
        let result = sandbox.execute("python", "print(1)").await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("python"));
    }

    #[tokio::test]
    async fn vector_store_round_trips_and_filters_by_collection() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(
                "threads",
                VectorRecord {
                    id: "1".to_string(),
                    text: "user asked about flight booking".to_string(),
                    metadata: serde_json::json!({"thread_id": "t1"}),
                },
            )
            .await
            .unwrap();
        store
            .upsert(
                "other",
                VectorRecord {
                    id: "2".to_string(),
                    text: "flight booking in another collection".to_string(),
                    metadata: serde_json::json!({}),
                },
            )
            .await
            .unwrap();

        let hits = store.query("threads", "flight", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");
    }

    #[tokio::test]
    async fn vector_store_respects_top_k() {
        let store = InMemoryVectorStore::new();
        for i in 0..5 {
            store
                .upsert(
                    "threads",
                    VectorRecord {
                        id: i.to_string(),
                        text: "archived turn".to_string(),
                        metadata: Value::Null,
                    },
                )
                .await
                .unwrap();
        }
        let hits = store.query("threads", "archived", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
    }
}
