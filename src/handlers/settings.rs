use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::db::StoreKey;
use crate::error::{AppError, AppResult};
use crate::models::queue::Action;
use crate::models::settings::AppSettings;
use crate::models::subscription::{SubscriptionInfo, SubscriptionTier, UpdateSubscriptionRequest};
use crate::AppState;

pub async fn get_settings(State(state): State<AppState>) -> AppResult<Json<AppSettings>> {
    let settings: AppSettings = state.store.load(StoreKey::AppSettings).await?;
    Ok(Json(settings))
}

/// Settings are queued and applied by the next sync.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(body): Json<AppSettings>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let outcome = state.queue.enqueue(Action::Settings(body)).await;
    if !outcome.persisted {
        return Err(AppError::Unavailable("Settings could not be saved".into()));
    }
    Ok((StatusCode::ACCEPTED, Json(json!({ "queue": outcome }))))
}

pub async fn get_subscription(State(state): State<AppState>) -> AppResult<Json<SubscriptionInfo>> {
    let tier: SubscriptionTier = state.store.load(StoreKey::Subscription).await?;
    Ok(Json(tier.into()))
}

pub async fn update_subscription(
    State(state): State<AppState>,
    Json(body): Json<UpdateSubscriptionRequest>,
) -> AppResult<Json<SubscriptionInfo>> {
    state.store.save(StoreKey::Subscription, body.tier).await?;
    tracing::info!(tier = ?body.tier, "Subscription tier changed");
    Ok(Json(body.tier.into()))
}
