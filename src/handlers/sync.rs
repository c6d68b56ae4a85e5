use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::StoreKey;
use crate::error::AppResult;
use crate::models::interaction::InteractionEvent;
use crate::services::network::Connectivity;
use crate::services::reconciler::SyncReport;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NetworkEvent {
    pub online: bool,
}

/// Feed a raw connectivity event to the monitor.
pub async fn report_network(
    State(state): State<AppState>,
    Json(body): Json<NetworkEvent>,
) -> Json<Value> {
    let changed = state.network.report(Connectivity::from_online(body.online));
    Json(json!({
        "online": state.network.is_online(),
        "changed": changed,
    }))
}

pub async fn sync_now(State(state): State<AppState>) -> Json<SyncReport> {
    Json(state.reconciler.reconcile_all().await)
}

pub async fn list_interactions(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<InteractionEvent>>> {
    let log: Vec<InteractionEvent> = state.store.load(StoreKey::InteractionLog).await?;
    Ok(Json(log))
}
