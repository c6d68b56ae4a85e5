use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::notifier::Permission;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PermissionRequest {
    pub permission: Permission,
}

pub async fn list_notifications(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "permission": state.notifier.permission().await,
        "toasts": state.notifier.recent_toasts().await,
    }))
}

pub async fn dismiss_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if state.notifier.dismiss(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Notification not found".into()))
    }
}

pub async fn set_permission(
    State(state): State<AppState>,
    Json(body): Json<PermissionRequest>,
) -> Json<Value> {
    state.notifier.set_permission(body.permission).await;
    Json(json!({ "permission": state.notifier.permission().await }))
}
