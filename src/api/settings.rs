//! Notification settings endpoints

use axum::{extract::State, Json};

use crate::{
    error::AppResult,
    models::settings::{UpdateUserSettings, UserSettings},
    AppState,
};

use super::AuthenticatedUser;

/// Notification settings of the caller
#[utoipa::path(
    get,
    path = "/settings/notifications",
    tag = "settings",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current settings", body = UserSettings)
    )
)]
pub async fn get_notification_settings(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<UserSettings>> {
    let settings = state.services.settings.get_settings(claims.user_id).await?;
    Ok(Json(settings))
}

/// Update notification settings (absent fields are left unchanged)
#[utoipa::path(
    put,
    path = "/settings/notifications",
    tag = "settings",
    security(("bearer_auth" = [])),
    request_body = UpdateUserSettings,
    responses(
        (status = 200, description = "Settings updated", body = UserSettings),
        (status = 400, description = "Invalid value")
    )
)]
pub async fn update_notification_settings(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<UpdateUserSettings>,
) -> AppResult<Json<UserSettings>> {
    let settings = state.services.settings.update_settings(claims.user_id, request).await?;
    Ok(Json(settings))
}
