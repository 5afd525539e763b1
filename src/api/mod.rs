pub mod error;
pub mod health;
pub mod response;
pub mod status;
pub mod v1;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::controller::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::liveness_check))
        .nest("/api/v1", v1::router(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
