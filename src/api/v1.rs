use axum::{
    routing::get,
    Router,
};

use crate::{
    api::{health, status},
    controller::AppState,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status::get_status))
        .route(
            "/settings",
            get(status::get_settings).put(status::put_settings),
        )
        .route("/healthz", get(health::liveness_check))
        .route("/health/live", get(health::liveness_check))
        .route("/health/ready", get(health::readiness_check))
        .with_state(state)
}
