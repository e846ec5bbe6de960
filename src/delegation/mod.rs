//! Task delegation (C7): decides whether an incoming query is simple
//! enough to answer directly or should be decomposed into subtasks and
//! fanned out across model tiers, then aggregates (and optionally
//! verifies) the results.

mod classify;

pub use classify::{complexity_score, decompose};

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::DelegationConfig;
use crate::error::ProviderError;
use crate::provider::{ClientPool, CompletionRequest, Message};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Strategy {
    Direct,
    Decompose,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subtask {
    pub id: usize,
    pub description: String,
    pub tier: String,
    /// Indices (into the same `Vec<Subtask>`) this subtask must wait on.
    /// Empty means it can run as soon as the round starts.
    pub depends_on: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubtaskOutcome {
    pub subtask: Subtask,
    pub answer: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DelegationResult {
    pub strategy: Strategy,
    pub outcomes: Vec<SubtaskOutcome>,
    pub aggregated_answer: String,
    pub verified: Option<bool>,
}

pub struct DelegationManager {
    pool: Arc<ClientPool>,
    config: DelegationConfig,
}

impl DelegationManager {
    pub fn new(pool: Arc<ClientPool>, config: DelegationConfig) -> Self {
        Self { pool, config }
    }

    pub fn choose_strategy(&self, query: &str) -> Strategy {
        if complexity_score(query) >= self.config.complexity_threshold {
            Strategy::Decompose
        } else {
            Strategy::Direct
        }
    }

    pub async fn run(&self, query: &str) -> Result<DelegationResult, ProviderError> {
        let strategy = self.choose_strategy(query);

        let subtasks = match strategy {
            Strategy::Direct => vec![Subtask {
                id: 0,
                description: query.to_string(),
                tier: self.default_tier(),
                depends_on: Vec::new(),
            }],
            Strategy::Decompose => decompose(query, &self.default_tier()),
        };

        let total = subtasks.len();
        let capped: Vec<_> = subtasks
            .into_iter()
            .take(self.config.max_parallel_subtasks)
            .collect();
        if capped.len() < total {
            warn!(
                dropped = total - capped.len(),
                "dropped excess subtasks beyond max_parallel_subtasks"
            );
        }

        let timeout = Duration::from_secs(self.config.subtask_timeout_secs);
        let outcomes = self.run_rounds(capped, timeout).await;

        let aggregated_answer = aggregate(&outcomes);
        let score = complexity_score(query);

        let mut final_answer = aggregated_answer.clone();
        let verified = if score > self.config.verification_threshold {
            match self.verify(query, &aggregated_answer).await {
                Ok(verdict) => {
                    if let Some(revised) = verdict.revised_answer {
                        final_answer = revised;
                    }
                    Some(verdict.passed)
                }
                Err(err) => {
                    warn!(%err, "delegation verification pass failed, keeping the aggregate as-is");
                    Some(false)
                }
            }
        } else {
            None
        };

        Ok(DelegationResult {
            strategy,
            outcomes,
            aggregated_answer: final_answer,
            verified,
        })
    }

    /// Runs subtasks in dependency order: each round dispatches every
    /// subtask whose `depends_on` are all already resolved, concurrently
    /// within the round, then feeds their outputs to the next round as
    /// extra context. A subtask whose dependency never resolves (e.g. a
    /// cyclic or out-of-range index) runs in the final round with
    /// whatever context is available, so the turn still terminates.
    async fn run_rounds(&self, subtasks: Vec<Subtask>, timeout: Duration) -> Vec<SubtaskOutcome> {
        let mut pending: Vec<Subtask> = subtasks;
        let mut done: Vec<SubtaskOutcome> = Vec::new();

        while !pending.is_empty() {
            let resolved_ids: std::collections::HashSet<usize> =
                done.iter().map(|o| o.subtask.id).collect();

            let mut ready = Vec::new();
            let mut rest = Vec::new();
            for subtask in pending {
                if subtask.depends_on.iter().all(|d| resolved_ids.contains(d)) {
                    ready.push(subtask);
                } else {
                    rest.push(subtask);
                }
            }

            // Nothing became ready this round (an unresolvable dependency):
            // run the rest anyway rather than spinning forever.
            if ready.is_empty() {
                ready = rest;
                rest = Vec::new();
            }

            let futures = ready.into_iter().map(|subtask| {
                let upstream_context = context_from(&subtask, &done);
                self.dispatch(subtask, timeout, upstream_context)
            });
            done.extend(join_all(futures).await);
            pending = rest;
        }

        done
    }

    fn default_tier(&self) -> String {
        self.pool.tiers().into_iter().next().unwrap_or_else(|| "fast".to_string())
    }

    /// Dispatches one subtask, retrying once on a different tier (if the
    /// pool has one) when the first attempt errors.
    async fn dispatch(
        &self,
        subtask: Subtask,
        timeout: Duration,
        upstream_context: Option<String>,
    ) -> SubtaskOutcome {
        let first_error = match self
            .dispatch_once(&subtask, &subtask.tier, timeout, upstream_context.as_deref())
            .await
        {
            Ok(answer) => {
                return SubtaskOutcome {
                    subtask,
                    answer: Some(answer),
                    error: None,
                }
            }
            Err(err) => err,
        };

        let fallback_tier = self
            .pool
            .tiers()
            .into_iter()
            .find(|tier| tier != &subtask.tier);

        if let Some(tier) = fallback_tier {
            warn!(
                subtask = subtask.id,
                original_tier = %subtask.tier,
                retry_tier = %tier,
                %first_error,
                "retrying failed subtask on a different tier"
            );
            match self
                .dispatch_once(&subtask, &tier, timeout, upstream_context.as_deref())
                .await
            {
                Ok(answer) => {
                    return SubtaskOutcome {
                        subtask,
                        answer: Some(answer),
                        error: None,
                    }
                }
                Err(retry_error) => {
                    return SubtaskOutcome {
                        subtask,
                        answer: None,
                        error: Some(retry_error),
                    }
                }
            }
        }

        SubtaskOutcome {
            subtask,
            answer: None,
            error: Some(first_error),
        }
    }

    async fn dispatch_once(
        &self,
        subtask: &Subtask,
        tier: &str,
        timeout: Duration,
        upstream_context: Option<&str>,
    ) -> Result<String, String> {
        let provider = self.pool.get(tier).map_err(|err| err.to_string())?;

        let prompt = match upstream_context {
            Some(context) => format!("{}\n\nContext from prior steps:\n{context}", subtask.description),
            None => subtask.description.clone(),
        };

        let request = CompletionRequest {
            messages: vec![Message::user(prompt)],
            temperature: 0.15,
            tools: Vec::new(),
        };

        match tokio::time::timeout(timeout, provider.complete(request)).await {
            Ok(Ok(response)) => Ok(response.content),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err("subtask timed out".to_string()),
        }
    }

    async fn verify(&self, query: &str, aggregated_answer: &str) -> Result<Verdict, ProviderError> {
        let tier = self.default_tier();
        let provider = self.pool.get(&tier)?;

        let request = CompletionRequest {
            messages: vec![
                Message::system(
                    "Critique whether the candidate answer fully and correctly addresses the \
                     original request. Reply with strict JSON: \
                     {\"passed\": true|false, \"revised_answer\": string or null}. \
                     Only set revised_answer when the candidate needs a correction.",
                ),
                Message::user(format!("Request: {query}\n\nCandidate answer: {aggregated_answer}")),
            ],
            temperature: 0.0,
            tools: Vec::new(),
        };

        let response = provider.complete(request).await?;
        let verdict = crate::workflow::json_extract::extract_json_object(&response.content)
            .and_then(|json| serde_json::from_str::<Verdict>(json).ok())
            .unwrap_or(Verdict {
                passed: response.content.to_lowercase().contains("yes")
                    || response.content.to_lowercase().contains("\"passed\":true")
                    || response.content.to_lowercase().contains("\"passed\": true"),
                revised_answer: None,
            });
        info!(passed = verdict.passed, revised = verdict.revised_answer.is_some(), "delegation verification complete");
        Ok(verdict)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct Verdict {
    passed: bool,
    #[serde(default)]
    revised_answer: Option<String>,
}

fn context_from(subtask: &Subtask, done: &[SubtaskOutcome]) -> Option<String> {
    if subtask.depends_on.is_empty() {
        return None;
    }
    let mut pieces = Vec::new();
    for dep in &subtask.depends_on {
        if let Some(outcome) = done.iter().find(|o| o.subtask.id == *dep) {
            match &outcome.answer {
                Some(answer) => pieces.push(format!("Step {dep}: {answer}")),
                None => pieces.push(format!(
                    "Step {dep}: status:error: {}",
                    outcome.error.as_deref().unwrap_or("unknown error")
                )),
            }
        }
    }
    if pieces.is_empty() {
        None
    } else {
        Some(pieces.join("\n"))
    }
}

fn aggregate(outcomes: &[SubtaskOutcome]) -> String {
    outcomes
        .iter()
        .map(|o| match &o.answer {
            Some(answer) => answer.clone(),
            None => format!(
                "status:error: {}",
                o.error.as_deref().unwrap_or("unknown error")
            ),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CompletionResponse, LLMProvider};
    use async_trait::async_trait;

    struct StubProvider {
        tier: String,
        reply: String,
    }

    #[async_trait]
    impl LLMProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        fn tier(&self) -> &str {
            &self.tier
        }
        async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                content: self.reply.clone(),
                model: "stub".to_string(),
                prompt_tokens: 0,
                completion_tokens: 0,
            })
        }
    }

    fn manager(reply: &str) -> DelegationManager {
        let pool = Arc::new(ClientPool::new(vec![Arc::new(StubProvider {
            tier: "fast".to_string(),
            reply: reply.to_string(),
        })]));
        DelegationManager::new(pool, DelegationConfig::default())
    }

    #[tokio::test]
    async fn simple_query_uses_direct_strategy() {
        let manager = manager("the answer");
        let result = manager.run("what time is it").await.unwrap();
        assert_eq!(result.strategy, Strategy::Direct);
        assert_eq!(result.outcomes.len(), 1);
        assert!(result.verified.is_none());
    }

    #[tokio::test]
    async fn complex_query_decomposes_and_verifies() {
        let manager = manager("partial answer");
        let query = "first search for the weather, then calculate the average, \
                     next check the humidity, and finally summarize all results for me";
        let result = manager.run(query).await.unwrap();
        assert_eq!(result.strategy, Strategy::Decompose);
        assert!(result.outcomes.len() > 1);
        assert!(result.verified.is_some());
    }

    #[tokio::test]
    async fn dependent_subtasks_receive_upstream_context() {
        let manager = manager("step done");
        let query = "first search for the weather, then calculate the average, \
                     next check the humidity, and finally summarize all results for me";
        let result = manager.run(query).await.unwrap();
        assert!(result.outcomes.len() > 1);
        assert!(result.outcomes[1..].iter().all(|o| o.error.is_none()));
    }

    struct FailingProvider {
        tier: String,
    }

    #[async_trait]
    impl LLMProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }
        fn tier(&self) -> &str {
            &self.tier
        }
        async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            Err(ProviderError::RequestFailed {
                provider: "failing".to_string(),
                reason: "boom".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn a_failed_subtask_is_retried_on_a_different_tier() {
        let pool = Arc::new(ClientPool::new(vec![
            Arc::new(FailingProvider {
                tier: "fast".to_string(),
            }),
            Arc::new(StubProvider {
                tier: "capable".to_string(),
                reply: "recovered answer".to_string(),
            }),
        ]));

        let manager = DelegationManager::new(pool, DelegationConfig::default());
        let subtasks = vec![Subtask {
            id: 0,
            description: "do something".to_string(),
            tier: "fast".to_string(),
            depends_on: Vec::new(),
        }];
        let outcomes = manager.run_rounds(subtasks, Duration::from_secs(5)).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].answer.as_deref(), Some("recovered answer"));
    }

    #[test]
    fn aggregate_includes_errored_subtasks_verbatim() {
        let outcomes = vec![
            SubtaskOutcome {
                subtask: Subtask {
                    id: 0,
                    description: "a".to_string(),
                    tier: "fast".to_string(),
                    depends_on: Vec::new(),
                },
                answer: Some("ok".to_string()),
                error: None,
            },
            SubtaskOutcome {
                subtask: Subtask {
                    id: 1,
                    description: "b".to_string(),
                    tier: "fast".to_string(),
                    depends_on: Vec::new(),
                },
                answer: None,
                error: Some("boom".to_string()),
            },
        ];
        let rendered = aggregate(&outcomes);
        assert!(rendered.contains("status:error: boom"));
    }
}
