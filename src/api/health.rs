use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::controller::AppState;

/// GET /health/ready - readiness probe. Ready once the supervisor has a
/// settings snapshot to serve, i.e. always after construction.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let _ = state.settings().await;
    StatusCode::OK
}

/// GET /healthz, GET /health/live - liveness probe.
pub async fn liveness_check() -> impl IntoResponse {
    StatusCode::OK
}
