//! The inbound HTTP surface: `POST /v1/query`, `GET /healthz`, `GET /metrics`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use schemars::JsonSchema;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::OrchestratorError;

use super::Orchestrator;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/v1/query", post(handle_query))
        .route("/v1/query/schema", get(query_schema))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/tools", get(list_tools))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(orchestrator)
}

async fn query_schema() -> impl IntoResponse {
    Json(schemars::schema_for!(QueryRequest))
}

async fn handle_query(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(request): Json<QueryRequest>,
) -> Response {
    match orchestrator
        .handle_query(&request.query, request.thread_id)
        .await
    {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

async fn metrics(State(orchestrator): State<Arc<Orchestrator>>) -> impl IntoResponse {
    let body = orchestrator.metrics().export_prometheus();
    (StatusCode::OK, body)
}

async fn list_tools(State(orchestrator): State<Arc<Orchestrator>>) -> impl IntoResponse {
    Json(orchestrator.tools().descriptors())
}

/// Reached only for Fatal-internal-class failures: `Orchestrator::handle_query`
/// folds Resource-exhausted errors (`MaxIterationsExceeded`, `DeadlineExceeded`)
/// and tool/provider failures into a normal `200 OK` `QueryResponse` whose
/// `answer` carries the message, since those are user-visible outcomes of
/// the turn rather than a failure of the call itself. The variants below
/// still need a status in case a caller other than the HTTP handler needs
/// one (e.g. a future CLI path), but should not occur on this path in
/// practice.
fn error_response(err: OrchestratorError) -> Response {
    let status = match &err {
        OrchestratorError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        OrchestratorError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
        OrchestratorError::MaxIterationsExceeded(_) => StatusCode::UNPROCESSABLE_ENTITY,
        OrchestratorError::Tool(_) | OrchestratorError::Provider(_) | OrchestratorError::Checkpoint(_) => {
            StatusCode::BAD_GATEWAY
        }
        OrchestratorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}
