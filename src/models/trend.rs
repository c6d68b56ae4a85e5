use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendCategory {
    Support,
    Care,
    Positive,
    Stability,
}

impl TrendCategory {
    pub const ALL: [TrendCategory; 4] = [
        TrendCategory::Support,
        TrendCategory::Care,
        TrendCategory::Positive,
        TrendCategory::Stability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrendCategory::Support => "support",
            TrendCategory::Care => "care",
            TrendCategory::Positive => "positive",
            TrendCategory::Stability => "stability",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            TrendCategory::Support => "We're here for you",
            TrendCategory::Care => "Checking in",
            TrendCategory::Positive => "You're doing great",
            TrendCategory::Stability => "Finding balance",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            TrendCategory::Support => {
                "You've had several low days this week. Some calming music or a short journal entry might help."
            }
            TrendCategory::Care => {
                "Your last few check-ins have been low. Take a moment for yourself today."
            }
            TrendCategory::Positive => {
                "Your mood has been consistently high. Keep doing what works for you."
            }
            TrendCategory::Stability => {
                "Your mood has been swinging a lot lately. A steady routine can help."
            }
        }
    }
}
