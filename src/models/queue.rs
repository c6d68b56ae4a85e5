use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::journal::JournalEntry;
use crate::models::mood::MoodEntry;
use crate::models::settings::AppSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Mood,
    Journal,
    Settings,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [ActionKind::Mood, ActionKind::Journal, ActionKind::Settings];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Mood => "mood",
            ActionKind::Journal => "journal",
            ActionKind::Settings => "settings",
        }
    }
}

/// A domain entity kept in a de-duplicated canonical list.
pub trait Reconcilable: Serialize + DeserializeOwned + Clone + Send + 'static {
    const KIND: ActionKind;

    /// Identity rule used for de-duplication.
    fn same_entry(&self, other: &Self) -> bool;

    /// Eager write into the canonical list. An entry that is already present
    /// is left alone.
    fn upsert_into(self, canonical: &mut Vec<Self>) {
        if !canonical.iter().any(|existing| existing.same_entry(&self)) {
            canonical.push(self);
        }
    }
}

/// A mutation waiting to be folded into its canonical collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction<T> {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> QueuedAction<T> {
    pub fn new(kind: ActionKind, data: T, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            data,
            timestamp,
        }
    }
}

/// A mutation submitted to the offline queue.
#[derive(Debug, Clone)]
pub enum Action {
    Mood(MoodEntry),
    Journal(JournalEntry),
    Settings(AppSettings),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Mood(_) => ActionKind::Mood,
            Action::Journal(_) => ActionKind::Journal,
            Action::Settings(_) => ActionKind::Settings,
        }
    }
}
