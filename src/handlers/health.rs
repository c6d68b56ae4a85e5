use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::AppState;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "melodica-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let store_ok = state.store.ping().await.is_ok();
    let metrics = state.store.metrics().snapshot();
    let worker = state.proxy.state().await;
    let windows = state.push.clients().count().await;

    if store_ok {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "checks": { "store": "ok", "worker": worker },
                "online": state.network.is_online(),
                "windows": windows,
                "metrics": metrics,
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": { "store": "failed", "worker": worker },
                "metrics": metrics,
            })),
        )
    }
}
