use std::fmt;

use crate::models::queue::ActionKind;
use crate::models::trend::TrendCategory;

/// Every durable key the application reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    MoodHistory,
    JournalEntries,
    Pending(ActionKind),
    AppSettings,
    Subscription,
    InteractionLog,
    TrendCooldown(TrendCategory),
    QuickMoods,
}

impl StoreKey {
    pub fn pending(kind: ActionKind) -> Self {
        Self::Pending(kind)
    }

    /// Where reconciled actions of `kind` end up.
    pub fn canonical(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Mood => Self::MoodHistory,
            ActionKind::Journal => Self::JournalEntries,
            ActionKind::Settings => Self::AppSettings,
        }
    }

    pub fn as_key(&self) -> String {
        match self {
            StoreKey::MoodHistory => "moodHistory".into(),
            StoreKey::JournalEntries => "journalEntries".into(),
            StoreKey::Pending(ActionKind::Mood) => "pendingMoods".into(),
            StoreKey::Pending(ActionKind::Journal) => "pendingJournals".into(),
            StoreKey::Pending(ActionKind::Settings) => "pendingSettings".into(),
            StoreKey::AppSettings => "appSettings".into(),
            StoreKey::Subscription => "subscription".into(),
            StoreKey::InteractionLog => "interactionLog".into(),
            StoreKey::TrendCooldown(category) => {
                format!("lastTrendNotification_{}", category.as_str())
            }
            StoreKey::QuickMoods => "quickMoods".into(),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_match_local_storage_names() {
        assert_eq!(StoreKey::MoodHistory.as_key(), "moodHistory");
        assert_eq!(StoreKey::pending(ActionKind::Journal).as_key(), "pendingJournals");
        assert_eq!(
            StoreKey::TrendCooldown(TrendCategory::Stability).as_key(),
            "lastTrendNotification_stability"
        );
        assert_eq!(StoreKey::QuickMoods.as_key(), "quickMoods");
    }
}
