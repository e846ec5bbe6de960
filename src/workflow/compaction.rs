//! Keeps the message history inside the configured context window by
//! summarizing older turns into a single message instead of truncating
//! them outright.

use tracing::{info, warn};

use crate::error::ProviderError;
use crate::provider::{CompletionRequest, LLMProvider, Message};
use crate::tools::VectorStoreClient;

use super::state::{WorkflowBounds, WorkflowState};

const ARCHIVE_COLLECTION: &str = "compacted-turns";

/// Replaces the oldest messages beyond `context_window` with a single
/// system message summarizing them, once the history grows past
/// `compaction_threshold`. A cheap no-op when the history is still short.
/// When `archive` is given, the replaced messages are upserted there
/// first so a later turn can still retrieve the verbatim originals.
pub async fn compact(
    provider: &dyn LLMProvider,
    state: &mut WorkflowState,
    bounds: &WorkflowBounds,
    archive: Option<&dyn VectorStoreClient>,
) -> Result<(), ProviderError> {
    if state.messages.len() <= bounds.compaction_threshold {
        return Ok(());
    }

    let keep_from = state.messages.len().saturating_sub(bounds.context_window);
    if keep_from == 0 {
        return Ok(());
    }

    let to_summarize = &state.messages[..keep_from];
    let summary = summarize(provider, to_summarize).await?;

    if let Some(archive) = archive {
        for (idx, message) in to_summarize.iter().enumerate() {
            let record = crate::tools::VectorRecord {
                id: format!("{}-{}-{idx}", state.thread_id, state.iteration),
                text: message.content.clone(),
                metadata: serde_json::json!({"role": format!("{:?}", message.role)}),
            };
            if let Err(err) = archive.upsert(ARCHIVE_COLLECTION, record).await {
                warn!(thread_id = %state.thread_id, %err, "failed to archive compacted message");
            }
        }
    }

    let mut compacted = Vec::with_capacity(bounds.context_window + 1);
    compacted.push(Message::system(format!(
        "Summary of earlier conversation: {summary}"
    )));
    compacted.extend_from_slice(&state.messages[keep_from..]);

    info!(
        thread_id = %state.thread_id,
        dropped = to_summarize.len(),
        kept = compacted.len(),
        "compacted workflow context"
    );
    state.messages = compacted;
    Ok(())
}

async fn summarize(provider: &dyn LLMProvider, messages: &[Message]) -> Result<String, ProviderError> {
    let transcript: String = messages
        .iter()
        .map(|m| format!("{:?}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let request = CompletionRequest {
        messages: vec![
            Message::system(
                "Summarize the following conversation turns in a few sentences, \
                 preserving any facts, decisions, or tool results a later turn might need.",
            ),
            Message::user(transcript),
        ],
        temperature: 0.0,
        tools: Vec::new(),
    };

    let response = provider.complete(request).await?;
    Ok(response.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::CompletionResponse;
    use async_trait::async_trait;

    struct StubProvider;

    #[async_trait]
    impl LLMProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        fn tier(&self) -> &str {
            "fast"
        }
        async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                content: "summary text".to_string(),
                model: "stub".to_string(),
                prompt_tokens: 0,
                completion_tokens: 0,
            })
        }
    }

    fn bounds() -> WorkflowBounds {
        WorkflowBounds {
            max_iterations: 5,
            context_window: 2,
            temperature: 0.0,
            max_tool_calls_per_turn: 5,
            compaction_threshold: 3,
        }
    }

    #[tokio::test]
    async fn short_history_is_left_untouched() {
        let mut state = WorkflowState::new("t1", "c1", "hello");
        let before = state.messages.len();
        compact(&StubProvider, &mut state, &bounds(), None).await.unwrap();
        assert_eq!(state.messages.len(), before);
    }

    #[tokio::test]
    async fn long_history_gets_summarized_into_one_message() {
        let mut state = WorkflowState::new("t1", "c1", "hello");
        for i in 0..6 {
            state.messages.push(Message::assistant(format!("turn {i}")));
        }
        compact(&StubProvider, &mut state, &bounds(), None).await.unwrap();
        assert!(state.messages.len() <= bounds().context_window + 1);
        assert!(state.messages[0].content.contains("summary text"));
    }

    #[tokio::test]
    async fn long_history_archives_dropped_messages_when_a_store_is_given() {
        use crate::tools::InMemoryVectorStore;

        let mut state = WorkflowState::new("t1", "c1", "hello");
        for i in 0..6 {
            state.messages.push(Message::assistant(format!("turn {i}")));
        }
        let archive = InMemoryVectorStore::new();
        compact(&StubProvider, &mut state, &bounds(), Some(&archive))
            .await
            .unwrap();

        let hits = archive.query(ARCHIVE_COLLECTION, "turn", 10).await.unwrap();
        assert!(!hits.is_empty());
    }
}
