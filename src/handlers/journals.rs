use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::db::StoreKey;
use crate::error::{AppError, AppResult};
use crate::models::journal::{CreateJournalRequest, JournalEntry};
use crate::models::queue::Action;
use crate::AppState;

pub async fn list_journals(State(state): State<AppState>) -> AppResult<Json<Vec<JournalEntry>>> {
    let mut entries: Vec<JournalEntry> = state.store.load_list(StoreKey::JournalEntries).await?;
    entries.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(Json(entries))
}

/// Create or edit. Posting an existing id replaces that entry.
pub async fn save_journal(
    State(state): State<AppState>,
    Json(body): Json<CreateJournalRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    body.validate()?;

    let entry = JournalEntry {
        id: body.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        title: body.title,
        content: body.content,
        mood: body.mood,
        music: body.music.unwrap_or_default(),
        date: body.date.unwrap_or_else(Utc::now),
    };

    let outcome = state.queue.enqueue(Action::Journal(entry.clone())).await;
    if !outcome.persisted {
        return Err(AppError::Unavailable("Journal entry could not be saved".into()));
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "entry": entry, "queue": outcome })),
    ))
}
