//! Health check endpoints

use crate::metrics::SyncMetrics;
use crate::registry::Registry;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub connections: usize,
    pub threshold: usize,
    pub threshold_met: bool,
    pub shards: Vec<usize>,
    pub broadcasting: bool,
}

/// Application state for health endpoints
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub threshold: usize,
    /// False in connectivity-test-only mode
    pub broadcasting: bool,
    pub metrics: SyncMetrics,
}

/// Create the health check router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Health endpoint - always returns 200 if process is running
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness endpoint - the acceptor is up, so always 200; body reports the
/// broadcast condition
async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    let shards = state.registry.shard_sizes();
    let connections: usize = shards.iter().sum();

    Json(ReadyResponse {
        ready: true,
        connections,
        threshold: state.threshold,
        threshold_met: connections >= state.threshold,
        shards,
        broadcasting: state.broadcasting,
    })
}

/// Metrics endpoint - returns Prometheus format metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state
        .metrics
        .set_active_connections(state.registry.total_count());

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.render(),
    )
}
