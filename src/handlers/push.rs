use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::worker::push::{ClickOutcome, PushPayload};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ClickRequest {
    pub action: Option<String>,
}

pub async fn receive_push(
    State(state): State<AppState>,
    body: Option<Json<PushPayload>>,
) -> Json<Value> {
    let payload = body.map(|Json(p)| p).unwrap_or_default();
    let shown = state.push.on_push(payload).await;
    Json(json!({ "shown": shown }))
}

pub async fn notification_click(
    State(state): State<AppState>,
    Json(body): Json<ClickRequest>,
) -> Json<ClickOutcome> {
    let outcome = state
        .push
        .on_notification_click(body.action.as_deref(), Utc::now())
        .await;
    Json(outcome)
}
