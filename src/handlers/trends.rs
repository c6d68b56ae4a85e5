use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::db::StoreKey;
use crate::error::AppResult;
use crate::models::subscription::{Entitlements, SubscriptionTier};
use crate::services::trends::{PassOutcome, PassTrigger};
use crate::AppState;

pub async fn get_trends(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let tier: SubscriptionTier = state.store.load(StoreKey::Subscription).await?;
    let report = state.trends.report().await?;
    let matched = report.as_ref().map(|r| r.matched()).unwrap_or_default();

    Ok(Json(json!({
        "entitled": Entitlements::for_tier(tier).mood_trend_alerts,
        "report": report,
        "matched": matched,
    })))
}

/// Run an on-demand pass. Quiet hours and the frequency setting do not apply.
pub async fn run_trends(State(state): State<AppState>) -> AppResult<Json<PassOutcome>> {
    let outcome = state.trends.run_pass(Utc::now(), PassTrigger::Manual).await?;
    Ok(Json(outcome))
}
