mod api;
mod charger;
mod config;
mod controller;
mod domain;
mod meter;
mod mitigation;
mod pipeline;
mod platform;
mod telemetry;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use config::AppConfig;
use telemetry::init_tracing;
use tracing::{info, warn};

use crate::controller::{spawn_controller_tasks, AppState, Supervisor};
use crate::platform::{Platform, SimulatedPlatform};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = AppConfig::load()?;
    init_tracing(&cfg.telemetry);

    let platform: Arc<dyn Platform> = Arc::new(SimulatedPlatform::new());
    let app_state: AppState = Supervisor::new(cfg.clone(), platform).await?;

    let app: Router = api::router(app_state.clone());

    let addr = cfg.server.socket_addr()?;
    info!(%addr, "starting loadguard");

    spawn_controller_tasks(app_state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
