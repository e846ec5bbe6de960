//! Top-level orchestrator (C8): wires intent classification, the
//! workflow engine, delegation, checkpointing, and recovery into a single
//! entry point, bounding total in-flight work with a semaphore.

pub mod http;

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Semaphore;
use tracing::{info, instrument};

use crate::checkpoint::{new_thread_id, CheckpointStore};
use crate::config::{OrchestratorConfig, RoutingConfig};
use crate::delegation::{DelegationManager, Strategy};
use crate::error::OrchestratorError;
use crate::intent::IntentClassifier;
use crate::provider::ClientPool;
use crate::recovery::RecoveryManager;
use crate::telemetry::MetricsCollector;
use crate::tools::{InMemoryVectorStore, ToolRegistry, VectorStoreClient};
use crate::workflow::{WorkflowBounds, WorkflowEngine, WorkflowOutcome, WorkflowState};

pub struct Orchestrator {
    config: OrchestratorConfig,
    routing: Arc<ArcSwap<RoutingConfig>>,
    tools: Arc<ToolRegistry>,
    pool: Arc<ClientPool>,
    checkpoints: Arc<CheckpointStore>,
    delegation: Arc<DelegationManager>,
    recovery: Arc<RecoveryManager>,
    metrics: Arc<MetricsCollector>,
    worker_permits: Arc<Semaphore>,
    archive: Arc<dyn VectorStoreClient>,
}

#[derive(Debug, serde::Serialize)]
pub struct QueryResponse {
    pub thread_id: String,
    pub answer: String,
    pub route: String,
    pub route_confidence: f32,
    pub iterations: u32,
    pub tool_calls_made: usize,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        routing: Arc<ArcSwap<RoutingConfig>>,
        tools: Arc<ToolRegistry>,
        pool: Arc<ClientPool>,
        checkpoints: Arc<CheckpointStore>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let delegation = Arc::new(DelegationManager::new(pool.clone(), config.delegation.clone()));
        let recovery = Arc::new(RecoveryManager::new(
            checkpoints.clone(),
            config.recovery.max_recovery_attempts,
            Duration::from_secs(config.recovery.min_incomplete_age_secs),
        ));
        let worker_permits = Arc::new(Semaphore::new(config.server.worker_concurrency));

        Self {
            config,
            routing,
            tools,
            pool,
            checkpoints,
            delegation,
            recovery,
            metrics,
            worker_permits,
            archive: Arc::new(InMemoryVectorStore::new()),
        }
    }

    /// Overrides the default in-memory archive with a real vector-store
    /// client, e.g. at startup once a production backend is configured.
    pub fn with_archive(mut self, archive: Arc<dyn VectorStoreClient>) -> Self {
        self.archive = archive;
        self
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn recovery(&self) -> &Arc<RecoveryManager> {
        &self.recovery
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Runs one recovery pass and records its outcome to metrics. Intended
    /// to be called on a timer (see `config.recovery.scan_interval_secs`).
    pub fn run_recovery_pass(&self) -> Result<(), OrchestratorError> {
        let report = self.recovery.run_pass()?;
        self.metrics
            .record_recovery_pass(report.recovered.len(), report.exhausted.len());
        Ok(())
    }

    #[instrument(skip(self, query))]
    pub async fn handle_query(&self, query: &str, thread_id: Option<String>) -> Result<QueryResponse, OrchestratorError> {
        let _permit = self
            .worker_permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| OrchestratorError::Overloaded)?;

        let thread_id = thread_id.unwrap_or_else(new_thread_id);
        self.checkpoints
            .mark_thread(&thread_id, crate::checkpoint::ThreadStatus::Incomplete)?;

        let routing_snapshot = self.routing.load();
        let classifier = IntentClassifier::new(&routing_snapshot);
        let route = classifier.classify(query);

        info!(thread_id = %thread_id, route = %route.service, confidence = route.confidence, "classified query");

        let analysis = classifier.analyze(query);
        if analysis.requires_clarification {
            let question = analysis
                .clarifying_question
                .unwrap_or_else(|| "Could you clarify your request?".to_string());
            self.checkpoints
                .mark_thread(&thread_id, crate::checkpoint::ThreadStatus::Complete)?;
            return Ok(QueryResponse {
                thread_id,
                answer: question,
                route: route.service,
                route_confidence: route.confidence,
                iterations: 0,
                tool_calls_made: 0,
            });
        }

        let tools_enabled = classifier.requires_tool(query);
        let strategy = self.delegation.choose_strategy(query);
        self.metrics.record_run_started();

        let deadline = self.config.server.request_deadline();
        let run_result = tokio::time::timeout(
            deadline,
            self.run_one(query, &thread_id, strategy, tools_enabled),
        )
        .await;

        // Resource-exhausted errors (max iterations, a deadline trip) and
        // errors surfaced from a tool/provider are terminal for the turn
        // but user-visible text, not a hard failure of the call: the
        // reply carries the message and the thread is still marked
        // complete. Only a genuine Fatal-internal error propagates as Err.
        let outcome = match run_result {
            Ok(Ok(outcome)) => Ok((outcome.final_message, outcome.iterations, outcome.tool_calls_made)),
            Ok(Err(
                err @ (OrchestratorError::MaxIterationsExceeded(_)
                | OrchestratorError::Tool(_)
                | OrchestratorError::Provider(_)),
            )) => Ok((err.to_string(), 0, 0)),
            Ok(Err(other)) => Err(other),
            Err(_) => Ok((OrchestratorError::DeadlineExceeded(deadline).to_string(), 0, 0)),
        };

        self.checkpoints
            .mark_thread(&thread_id, crate::checkpoint::ThreadStatus::Complete)?;

        let (answer, iterations, tool_calls_made) = outcome?;

        Ok(QueryResponse {
            thread_id,
            answer,
            route: route.service,
            route_confidence: route.confidence,
            iterations,
            tool_calls_made,
        })
    }

    async fn run_one(
        &self,
        query: &str,
        thread_id: &str,
        strategy: Strategy,
        tools_enabled: bool,
    ) -> Result<WorkflowOutcome, OrchestratorError> {
        if strategy == Strategy::Decompose {
            let result = self.delegation.run(query).await?;
            self.metrics
                .record_delegation_decomposed(result.outcomes.len());
            if result.verified == Some(false) {
                self.metrics.record_verification_failure();
            }
            return Ok(WorkflowOutcome {
                thread_id: thread_id.to_string(),
                final_message: result.aggregated_answer,
                iterations: 1,
                tool_calls_made: 0,
            });
        }

        self.metrics.record_delegation_direct();
        let tier = self.pool.tiers().into_iter().next().unwrap_or_else(|| "fast".to_string());
        let provider = self.pool.get(&tier)?;
        let bounds = WorkflowBounds::from(&self.config.workflow);
        let engine = WorkflowEngine::new(provider, self.tools.clone(), self.checkpoints.clone(), bounds)
            .with_archive(self.archive.clone());
        let mut state = WorkflowState::new(thread_id, thread_id, query);
        state.tools_enabled = tools_enabled;

        match engine.run(state).await {
            Ok(outcome) => {
                self.metrics.record_run_completed(outcome.iterations);
                Ok(outcome)
            }
            Err(err) => {
                if let OrchestratorError::MaxIterationsExceeded(n) = &err {
                    self.metrics.record_run_incomplete(*n);
                }
                Err(err)
            }
        }
    }
}

/// Spawns a background task that calls [`Orchestrator::run_recovery_pass`]
/// on `config.recovery.scan_interval_secs`.
pub fn spawn_recovery_loop(orchestrator: Arc<Orchestrator>) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_secs(orchestrator.config.recovery.scan_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = orchestrator.run_recovery_pass() {
                tracing::error!(%err, "recovery pass failed");
            }
        }
    })
}
