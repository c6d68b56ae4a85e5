use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::queue::{ActionKind, Reconcilable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    pub mood: i32,
    #[serde(default)]
    pub music: String,
    pub date: DateTime<Utc>,
}

impl Reconcilable for JournalEntry {
    const KIND: ActionKind = ActionKind::Journal;

    fn same_entry(&self, other: &Self) -> bool {
        self.id == other.id
    }

    /// Saving an existing id is an edit.
    fn upsert_into(self, canonical: &mut Vec<Self>) {
        match canonical.iter_mut().find(|existing| existing.id == self.id) {
            Some(existing) => *existing = self,
            None => canonical.push(self),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateJournalRequest {
    /// Client-generated id, so an entry written offline keeps its identity.
    #[validate(length(min = 1, max = 64, message = "Id must be 1-64 characters"))]
    pub id: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    #[validate(length(max = 20000, message = "Content too long"))]
    pub content: String,
    #[validate(range(min = 1, max = 10, message = "Mood must be between 1 and 10"))]
    pub mood: i32,
    pub music: Option<String>,
    pub date: Option<DateTime<Utc>>,
}
