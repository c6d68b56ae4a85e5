//! Push messages and notification clicks.
//!
//! Moods logged from a notification are kept under their own store key until
//! the offline queue has taken them, and are broadcast to every open window.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::db::{KvStore, StoreError, StoreKey};
use crate::models::mood::{MoodEntry, MoodScore};
use crate::models::queue::Reconcilable;
use crate::models::subscription::{Entitlements, SubscriptionTier};
use crate::services::notifier::{NotificationAction, NotificationCenter, PlatformNotification};

pub const DASHBOARD_URL: &str = "/dashboard";

const PUSH_MOOD_VALUES: [u8; 5] = [1, 3, 5, 7, 10];
const MESSAGE_BUFFER: usize = 64;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
}

/// Messages from the worker to open windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    QuickMoodLog { mood: MoodEntry },
    Focus { client_id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClickOutcome {
    MoodLogged { mood: MoodEntry },
    Focused { client_id: Uuid },
    Opened { url: String },
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowClient {
    pub id: Uuid,
    pub url: String,
}

/// Open application windows, in the order they connected.
#[derive(Clone, Default)]
pub struct WindowClients {
    windows: Arc<RwLock<Vec<WindowClient>>>,
}

impl WindowClients {
    pub async fn register(&self, url: impl Into<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.windows.write().await.push(WindowClient {
            id,
            url: url.into(),
        });
        id
    }

    pub async fn unregister(&self, id: Uuid) {
        self.windows.write().await.retain(|w| w.id != id);
    }

    pub async fn first(&self) -> Option<WindowClient> {
        self.windows.read().await.first().cloned()
    }

    pub async fn count(&self) -> usize {
        self.windows.read().await.len()
    }
}

#[derive(Clone)]
pub struct PushHandler {
    store: KvStore,
    notifier: NotificationCenter,
    clients: WindowClients,
    messages: broadcast::Sender<ClientMessage>,
}

impl PushHandler {
    pub fn new(store: KvStore, notifier: NotificationCenter, clients: WindowClients) -> Self {
        let (messages, _) = broadcast::channel(MESSAGE_BUFFER);
        Self {
            store,
            notifier,
            clients,
            messages,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.messages.subscribe()
    }

    pub fn clients(&self) -> &WindowClients {
        &self.clients
    }

    pub async fn on_push(&self, payload: PushPayload) -> bool {
        tracing::debug!(title = ?payload.title, "Push received");
        let tier: SubscriptionTier = match self.store.load(StoreKey::Subscription).await {
            Ok(tier) => tier,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read subscription, assuming free tier");
                SubscriptionTier::default()
            }
        };
        let mood_actions = Entitlements::for_tier(tier).quick_mood_actions;
        self.notifier
            .platform(push_notification(payload, mood_actions))
            .await
    }

    pub async fn on_notification_click(&self, action: Option<&str>, now: DateTime<Utc>) -> ClickOutcome {
        match action {
            Some(action) if action.starts_with("mood-") => match parse_mood_action(action) {
                Some(score) => self.log_quick_mood(score, now).await,
                None => {
                    tracing::warn!(action, "Unrecognized mood action");
                    ClickOutcome::Ignored
                }
            },
            Some(action) if !action.is_empty() => {
                tracing::debug!(action, "Ignoring notification action");
                ClickOutcome::Ignored
            }
            _ => self.focus_or_open().await,
        }
    }

    /// Moods logged from notifications that the offline queue has not taken
    /// yet.
    pub async fn stored_quick_moods(&self) -> Result<Vec<MoodEntry>, StoreError> {
        self.store.load_list(StoreKey::QuickMoods).await
    }

    /// Drop stored quick moods that have been handed to the offline queue.
    pub async fn acknowledge(&self, taken: Vec<MoodEntry>) -> Result<(), StoreError> {
        if taken.is_empty() {
            return Ok(());
        }
        let key = StoreKey::QuickMoods;
        self.store
            .transact(&[key], move |snapshot| {
                let Some(mut stored) = snapshot.read_list::<MoodEntry>(key) else {
                    return;
                };
                stored
                    .items
                    .retain(|mood| !taken.iter().any(|t| t.same_entry(mood)));
                snapshot.write_list(key, &stored);
            })
            .await
    }

    async fn log_quick_mood(&self, score: MoodScore, now: DateTime<Utc>) -> ClickOutcome {
        let entry = MoodEntry {
            notes: Some("Logged from notification".into()),
            ..MoodEntry::new(score, now)
        };

        let key = StoreKey::QuickMoods;
        let stored = entry.clone();
        let saved = self
            .store
            .transact(&[key], move |snapshot| match snapshot.read_list::<MoodEntry>(key) {
                Some(mut moods) => {
                    moods.items.push(stored);
                    snapshot.write_list(key, &moods);
                    true
                }
                None => false,
            })
            .await;
        match saved {
            Ok(true) => {}
            Ok(false) => tracing::error!("Quick mood store unreadable, mood only broadcast"),
            Err(e) => tracing::error!(error = %e, "Failed to store quick mood"),
        }

        let delivered = self
            .messages
            .send(ClientMessage::QuickMoodLog { mood: entry.clone() })
            .unwrap_or(0);
        tracing::info!(mood = score.value(), delivered, "Quick mood logged");

        self.notifier
            .platform(
                PlatformNotification::new(
                    "Mood logged",
                    format!("Thanks! Your mood ({}/10) has been recorded.", score.value()),
                )
                .with_tag("mood-logged"),
            )
            .await;

        ClickOutcome::MoodLogged { mood: entry }
    }

    async fn focus_or_open(&self) -> ClickOutcome {
        if let Some(window) = self.clients.first().await {
            let _ = self.messages.send(ClientMessage::Focus {
                client_id: window.id,
            });
            return ClickOutcome::Focused {
                client_id: window.id,
            };
        }
        ClickOutcome::Opened {
            url: DASHBOARD_URL.to_string(),
        }
    }
}

pub fn parse_mood_action(action: &str) -> Option<MoodScore> {
    let value = action.strip_prefix("mood-")?.parse::<i64>().ok()?;
    MoodScore::new(value).ok()
}

pub fn push_notification(payload: PushPayload, mood_actions: bool) -> PlatformNotification {
    let actions = if mood_actions {
        PUSH_MOOD_VALUES
            .iter()
            .map(|n| NotificationAction {
                action: format!("mood-{n}"),
                title: n.to_string(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let mut notification = PlatformNotification::new(
        payload.title.unwrap_or_else(|| "Melodica".into()),
        payload
            .body
            .unwrap_or_else(|| "How are you feeling right now?".into()),
    )
    .with_icon(
        payload
            .icon
            .unwrap_or_else(|| "/icons/icon-192x192.png".into()),
    )
    .with_tag("mood-check-in")
    .with_actions(actions);
    notification.require_interaction = true;
    notification
}
