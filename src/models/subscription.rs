use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Plus,
    Pro,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct Entitlements {
    pub mood_trend_alerts: bool,
    pub history_days: Option<i64>,
    pub quick_mood_actions: bool,
}

impl Entitlements {
    pub fn for_tier(tier: SubscriptionTier) -> Self {
        match tier {
            SubscriptionTier::Free => Self {
                mood_trend_alerts: false,
                history_days: Some(7),
                quick_mood_actions: true,
            },
            SubscriptionTier::Plus => Self {
                mood_trend_alerts: true,
                history_days: Some(90),
                quick_mood_actions: true,
            },
            SubscriptionTier::Pro => Self {
                mood_trend_alerts: true,
                history_days: None,
                quick_mood_actions: true,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubscriptionInfo {
    pub tier: SubscriptionTier,
    pub entitlements: Entitlements,
}

impl From<SubscriptionTier> for SubscriptionInfo {
    fn from(tier: SubscriptionTier) -> Self {
        Self {
            tier,
            entitlements: Entitlements::for_tier(tier),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub tier: SubscriptionTier,
}
