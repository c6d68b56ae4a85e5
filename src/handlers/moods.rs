use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use validator::Validate;

use crate::db::StoreKey;
use crate::error::{AppError, AppResult};
use crate::models::mood::{LogMoodRequest, MoodEntry, MoodQuery, MoodScore};
use crate::models::queue::Action;
use crate::models::subscription::{Entitlements, SubscriptionTier};
use crate::AppState;

/// Longest window a query may ask for.
const MAX_QUERY_DAYS: i64 = 36_500;

/// Mood history, newest first. The visible window is capped by the tier.
pub async fn list_moods(
    State(state): State<AppState>,
    Query(query): Query<MoodQuery>,
) -> AppResult<Json<Vec<MoodEntry>>> {
    let tier: SubscriptionTier = state.store.load(StoreKey::Subscription).await?;
    let allowed = Entitlements::for_tier(tier).history_days;

    let days = match (query.days, allowed) {
        (Some(d), Some(max)) => Some(d.clamp(1, max)),
        (Some(d), None) => Some(d.clamp(1, MAX_QUERY_DAYS)),
        (None, max) => max,
    };

    let mut history: Vec<MoodEntry> = state.store.load_list(StoreKey::MoodHistory).await?;
    if let Some(days) = days {
        let since = Duration::try_days(days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| AppError::Validation(format!("days out of range: {days}")))?;
        history.retain(|m| m.timestamp >= since);
    }
    history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    Ok(Json(history))
}

pub async fn log_mood(
    State(state): State<AppState>,
    Json(body): Json<LogMoodRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    body.validate()?;
    let score = MoodScore::new(body.mood).map_err(|e| AppError::Validation(e.to_string()))?;

    let entry = MoodEntry {
        notes: body.notes,
        activities: body.activities,
        music: body.music,
        ..MoodEntry::new(score, body.timestamp.unwrap_or_else(Utc::now))
    };

    let outcome = state.queue.enqueue(Action::Mood(entry.clone())).await;
    if !outcome.persisted {
        return Err(AppError::Unavailable("Mood could not be saved".into()));
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "mood": entry, "queue": outcome })),
    ))
}
