use axum::{extract::State, Json};

use crate::{
    api::{error::ApiError, response::ApiResponse},
    controller::AppState,
    domain::{Settings, Status},
};

/// GET /api/v1/status - current enforcement state: power reading, limit,
/// mitigated devices, charger states, energy history and tariff tier.
pub async fn get_status(State(state): State<AppState>) -> Json<ApiResponse<Status>> {
    Json(ApiResponse::success(state.get_status().await))
}

/// GET /api/v1/settings - the current persisted settings.
pub async fn get_settings(State(state): State<AppState>) -> Json<ApiResponse<Settings>> {
    Json(ApiResponse::success(state.settings().await))
}

/// PUT /api/v1/settings - replace settings wholesale. Validated before
/// being applied; a control-relevant change (limit, profile, enabled,
/// phase limits) forces an immediate recheck bypassing hysteresis.
pub async fn put_settings(
    State(state): State<AppState>,
    Json(new_settings): Json<Settings>,
) -> Result<Json<ApiResponse<Settings>>, ApiError> {
    state.update_settings(new_settings).await?;
    Ok(Json(ApiResponse::success(state.settings().await)))
}
