//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (room has capacity left)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::api::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// Joined connections
    pub connections: usize,
    /// Distinct display names online
    pub online_users: usize,
    pub uptime_seconds: u64,
    pub version: String,
}

/// GET /health/live
///
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Returns 503 once the room is full and new joins would be refused.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    if has_capacity(&state).await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health
///
/// Full health status with room statistics.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let registry = state.hub.registry();
    let status = if has_capacity(&state).await {
        "healthy"
    } else {
        "full"
    };

    Json(HealthResponse {
        status: status.to_string(),
        connections: registry.connection_count().await,
        online_users: registry.online_count().await,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn has_capacity(state: &AppState) -> bool {
    state.hub.registry().connection_count().await < state.hub.config().max_connections
}
