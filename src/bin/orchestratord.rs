use std::sync::Arc;

use agent_orchestration_core::checkpoint::CheckpointStore;
use agent_orchestration_core::circuit_breaker::CircuitBreaker;
use agent_orchestration_core::cli::Cli;
use agent_orchestration_core::config::{watch_routing_config, OrchestratorConfig, RoutingConfig};
use agent_orchestration_core::orchestrator::http;
use agent_orchestration_core::orchestrator::{spawn_recovery_loop, Orchestrator};
use agent_orchestration_core::provider::{ClientPool, HttpChatProvider, LLMProvider};
use agent_orchestration_core::telemetry::{init_tracing, MetricsCollector};
use agent_orchestration_core::tools::ToolRegistry;

use arc_swap::ArcSwap;
use clap::Parser;
use tracing::info;

fn build_providers() -> Vec<Arc<dyn LLMProvider>> {
    let fast_endpoint = std::env::var("ORCH_FAST_PROVIDER_URL")
        .unwrap_or_else(|_| "http://localhost:11434/v1/chat/completions".to_string());
    let capable_endpoint = std::env::var("ORCH_CAPABLE_PROVIDER_URL")
        .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
    let api_key = std::env::var("ORCH_PROVIDER_API_KEY").ok();

    vec![
        Arc::new(HttpChatProvider::new(
            "fast-local",
            "fast",
            fast_endpoint,
            "local-small",
            None,
        )),
        Arc::new(HttpChatProvider::new(
            "capable-remote",
            "capable",
            capable_endpoint,
            "gpt-4o-mini",
            api_key,
        )),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = OrchestratorConfig::load(&cli.config)?;
    info!(
        bind_addr = %config.server.bind_addr,
        deadline = %humantime::format_duration(config.server.request_deadline()),
        "loaded configuration"
    );

    let routing_path = cli
        .routing_config
        .map(|p| p.to_string_lossy().to_string())
        .or_else(|| config.routing_config_path.clone());

    let routing_handle = Arc::new(ArcSwap::from_pointee(RoutingConfig::default()));
    let _watcher = match &routing_path {
        Some(path) => Some(watch_routing_config(path, routing_handle.clone())?),
        None => None,
    };

    let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
    let tools = Arc::new(ToolRegistry::new(
        breaker,
        config.server.request_deadline(),
    ));
    let pool = Arc::new(ClientPool::new(build_providers()));
    let checkpoints = Arc::new(CheckpointStore::open(
        &config.checkpoint.db_path,
        config.checkpoint.flush_every_write,
    )?);
    let metrics = Arc::new(MetricsCollector::new());

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        routing_handle,
        tools,
        pool,
        checkpoints,
        metrics,
    ));

    if let Some(query) = cli.query {
        let response = orchestrator.handle_query(&query, None).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let _recovery_task = spawn_recovery_loop(orchestrator.clone());

    let app = http::router(orchestrator);
    let listener = tokio::net::TcpListener::bind(config.server.bind_addr).await?;
    info!(bind_addr = %config.server.bind_addr, "orchestratord listening");
    axum::serve(listener, app).await?;

    Ok(())
}
