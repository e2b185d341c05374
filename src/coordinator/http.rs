//! HTTP API of a replikv node
//!
//! Client-facing:
//! - `GET /v0/status` liveness
//! - `GET|PUT|DELETE /v0/entity?id=<key>&replicas=<ack>/<from>` coordinated operations
//! - `GET /v0/metrics` Prometheus text
//!
//! Node-to-node:
//! - `GET|PUT|DELETE /v0/inner?id=<key>` local storage only, never fans out

use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::{timestamp_now_millis, Error, Record};
use crate::coordinator::quorum::{ReplicaOutcome, Verdict};
use crate::coordinator::replica_client::{apply_local, ReplicaOp, INNER_PATH, TIMESTAMP_HEADER};
use crate::coordinator::service::Coordinator;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;

pub const STATUS_PATH: &str = "/v0/status";
pub const ENTITY_PATH: &str = "/v0/entity";
pub const METRICS_PATH: &str = "/v0/metrics";

/// Shared node state for HTTP handlers.
#[derive(Clone)]
pub struct NodeState {
    pub coordinator: Arc<Coordinator>,
}

#[derive(Debug, Deserialize)]
pub struct EntityParams {
    id: Option<String>,
    replicas: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InnerParams {
    id: Option<String>,
}

impl IntoResponse for Verdict {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Verdict::Found(record) => (status, record.value).into_response(),
            _ => status.into_response(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.to_http_status(), self.to_string()).into_response()
    }
}

/// Creates the HTTP router with all public and inner endpoints.
pub fn create_router(state: NodeState) -> Router {
    Router::new()
        .route(STATUS_PATH, get(status))
        .route(METRICS_PATH, get(metrics))
        .route(
            ENTITY_PATH,
            get(entity_get)
                .put(entity_put)
                .delete(entity_delete)
                .fallback(method_not_allowed),
        )
        .route(
            INNER_PATH,
            get(inner_get)
                .put(inner_put)
                .delete(inner_delete)
                .fallback(method_not_allowed),
        )
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_tracing_middleware))
                .layer(DefaultBodyLimit::disable()),
        )
        .with_state(state)
}

async fn status(State(state): State<NodeState>) -> impl IntoResponse {
    let coord = &state.coordinator;
    let body = json!({
        "status": "ok",
        "node": coord.client().self_addr(),
        "cluster_size": coord.topology().len(),
        "topology": coord.topology().nodes(),
        "version": crate::VERSION,
        "uptime_secs": coord.metrics().uptime().as_secs(),
    });
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        body.to_string(),
    )
}

async fn metrics(State(state): State<NodeState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.coordinator.metrics().to_prometheus(),
    )
}

async fn method_not_allowed() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, "Method is not allowed")
}

// ============================================================================
// Coordinated operations
// ============================================================================

async fn entity_get(
    State(state): State<NodeState>,
    Query(params): Query<EntityParams>,
) -> Result<Verdict, Error> {
    let coord = &state.coordinator;
    let (key, quorum) = coord.validate(params.id.as_deref(), params.replicas.as_deref())?;
    coord.coordinate_get(&key, quorum).await
}

async fn entity_put(
    State(state): State<NodeState>,
    Query(params): Query<EntityParams>,
    body: Bytes,
) -> Result<Verdict, Error> {
    let coord = &state.coordinator;
    let (key, quorum) = coord.validate(params.id.as_deref(), params.replicas.as_deref())?;
    coord.coordinate_put(&key, body, quorum).await
}

async fn entity_delete(
    State(state): State<NodeState>,
    Query(params): Query<EntityParams>,
) -> Result<Verdict, Error> {
    let coord = &state.coordinator;
    let (key, quorum) = coord.validate(params.id.as_deref(), params.replicas.as_deref())?;
    coord.coordinate_delete(&key, quorum).await
}

// ============================================================================
// Inner (node-to-node) operations
// ============================================================================

fn inner_key(params: InnerParams) -> Result<String, Error> {
    match params.id {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(Error::InvalidRequest("id is missing or empty".into())),
    }
}

/// Run a storage operation on the blocking pool
async fn run_local(state: &NodeState, key: String, op: ReplicaOp) -> Result<ReplicaOutcome, Error> {
    let storage = state.coordinator.client().storage().clone();
    tokio::task::spawn_blocking(move || apply_local(&storage, &key, &op)).await?
}

async fn inner_get(
    State(state): State<NodeState>,
    Query(params): Query<InnerParams>,
) -> Result<Response, Error> {
    let key = inner_key(params)?;
    match run_local(&state, key, ReplicaOp::Get).await? {
        ReplicaOutcome::Found(record) => Ok((
            StatusCode::OK,
            [(TIMESTAMP_HEADER, record.timestamp.to_string())],
            record.value,
        )
            .into_response()),
        ReplicaOutcome::NotFound => Ok(StatusCode::NOT_FOUND.into_response()),
        other => Err(Error::Internal(format!("unexpected local outcome {:?}", other))),
    }
}

async fn inner_put(
    State(state): State<NodeState>,
    Query(params): Query<InnerParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, Error> {
    let key = inner_key(params)?;
    let timestamp = match headers.get(TIMESTAMP_HEADER) {
        Some(v) => v
            .to_str()
            .ok()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| Error::InvalidRequest(format!("malformed {} header", TIMESTAMP_HEADER)))?,
        None => timestamp_now_millis(),
    };

    run_local(&state, key, ReplicaOp::Put(Record::new(timestamp, body))).await?;
    Ok(StatusCode::CREATED)
}

async fn inner_delete(
    State(state): State<NodeState>,
    Query(params): Query<InnerParams>,
) -> Result<StatusCode, Error> {
    let key = inner_key(params)?;
    run_local(&state, key, ReplicaOp::Delete).await?;
    Ok(StatusCode::ACCEPTED)
}
