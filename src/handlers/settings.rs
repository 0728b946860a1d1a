use axum::{
    extract::{Path, State},
    response::Json,
};

use crate::auth::{Action, AuthUser};
use crate::entities::store_setting;
use crate::errors::ServiceError;
use crate::services::settings::PutSettingRequest;
use crate::{ApiResponse, ApiResult, AppState};

pub async fn list_settings(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<store_setting::Model>> {
    user.require(Action::SettingsRead)?;

    let settings = state.services.settings.list_settings().await?;
    Ok(Json(ApiResponse::success(settings)))
}

pub async fn get_setting(
    State(state): State<AppState>,
    user: AuthUser,
    Path(key): Path<String>,
) -> ApiResult<store_setting::Model> {
    user.require(Action::SettingsRead)?;

    match state.services.settings.get_setting(&key).await? {
        Some(setting) => Ok(Json(ApiResponse::success(setting))),
        None => Err(ServiceError::NotFound(format!("Setting {key} not found"))),
    }
}

pub async fn put_setting(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PutSettingRequest>,
) -> ApiResult<store_setting::Model> {
    user.require(Action::SettingsWrite)?;

    let saved = state
        .services
        .settings
        .put_setting(user.user_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(saved)))
}
