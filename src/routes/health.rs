//! Health check endpoints for Kubernetes probes and monitoring.

use axum::{Json, extract::State, response::IntoResponse};
use http::StatusCode;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// "healthy" or "unhealthy".
    pub status: String,
    pub version: String,
    pub cache: ComponentStatus,
}

#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub latency_ms: u64,
}

/// Full health check. The cache is the only stateful dependency; without
/// it no login can complete, so a cache failure means unhealthy.
#[tracing::instrument(name = "health.check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = std::time::Instant::now();
    let cache_result = state.cache.get_bytes("health:probe").await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let healthy = cache_result.is_ok();
    let health = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cache: ComponentStatus {
            healthy,
            message: cache_result.err().map(|e| e.to_string()),
            latency_ms,
        },
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(health))
}

/// Kubernetes liveness probe. Succeeds whenever the process is running.
#[tracing::instrument(name = "health.liveness")]
pub async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}

/// Kubernetes readiness probe. Ready once the cache answers.
#[tracing::instrument(name = "health.readiness", skip(state))]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if state.cache.get_bytes("health:probe").await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}
