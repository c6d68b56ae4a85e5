use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::queue::{ActionKind, Reconcilable};

pub const MIN_MOOD: u8 = 1;
pub const MAX_MOOD: u8 = 10;

/// Moods at or below this are counted as low days by trend analysis.
pub const LOW_MOOD_THRESHOLD: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct MoodScore(u8);

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("mood must be between 1 and 10, got {0}")]
pub struct InvalidMood(pub i64);

impl MoodScore {
    pub fn new(value: i64) -> Result<Self, InvalidMood> {
        if (MIN_MOOD as i64..=MAX_MOOD as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(InvalidMood(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_low(self) -> bool {
        self.0 <= LOW_MOOD_THRESHOLD
    }
}

impl TryFrom<i64> for MoodScore {
    type Error = InvalidMood;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MoodScore> for u8 {
    fn from(score: MoodScore) -> Self {
        score.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodEntry {
    pub mood: MoodScore,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music: Option<String>,
}

impl MoodEntry {
    pub fn new(mood: MoodScore, timestamp: DateTime<Utc>) -> Self {
        Self {
            mood,
            timestamp,
            notes: None,
            activities: None,
            music: None,
        }
    }
}

impl Reconcilable for MoodEntry {
    const KIND: ActionKind = ActionKind::Mood;

    /// Same timestamp and same score means the same logical entry.
    fn same_entry(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.mood == other.mood
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct LogMoodRequest {
    #[validate(range(min = 1, max = 10, message = "Mood must be between 1 and 10"))]
    pub mood: i64,
    pub timestamp: Option<DateTime<Utc>>,
    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
    pub activities: Option<Vec<String>>,
    pub music: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoodQuery {
    pub days: Option<i64>,
}
