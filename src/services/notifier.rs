//! Notification dispatch.
//!
//! `NotificationCenter` is created once at startup and handed to every
//! component that needs to alert the user. It keeps the in-app toast list and
//! the platform permission state, and fans every dispatched notification out
//! to subscribers (the `/ws` clients).

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use uuid::Uuid;

const MAX_TOASTS: usize = 50;
const EVENT_BUFFER: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Toast {
    pub id: Uuid,
    pub kind: ToastKind,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformNotification {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
    pub require_interaction: bool,
}

impl PlatformNotification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: None,
            tag: None,
            actions: Vec::new(),
            require_interaction: false,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_actions(mut self, actions: Vec<NotificationAction>) -> Self {
        self.actions = actions;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    Default,
    Granted,
    Denied,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    Toast(Toast),
    Platform(PlatformNotification),
    Dismissed { id: Uuid },
}

#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<Inner>,
}

struct Inner {
    permission: RwLock<Permission>,
    toasts: Mutex<VecDeque<Toast>>,
    events: broadcast::Sender<NotificationEvent>,
}

impl NotificationCenter {
    pub fn new(permission: Permission) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(Inner {
                permission: RwLock::new(permission),
                toasts: Mutex::new(VecDeque::new()),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.inner.events.subscribe()
    }

    pub async fn toast(
        &self,
        kind: ToastKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Toast {
        let toast = Toast {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            message: message.into(),
            created_at: Utc::now(),
        };

        {
            let mut toasts = self.inner.toasts.lock().await;
            toasts.push_back(toast.clone());
            while toasts.len() > MAX_TOASTS {
                toasts.pop_front();
            }
        }

        tracing::debug!(kind = ?toast.kind, title = %toast.title, "Toast dispatched");
        let _ = self.inner.events.send(NotificationEvent::Toast(toast.clone()));
        toast
    }

    /// Show a platform notification. Returns `false` without dispatching when
    /// permission has not been granted.
    pub async fn platform(&self, notification: PlatformNotification) -> bool {
        if *self.inner.permission.read().await != Permission::Granted {
            tracing::debug!(title = %notification.title, "Platform notification suppressed, no permission");
            return false;
        }

        tracing::info!(title = %notification.title, tag = ?notification.tag, "Platform notification dispatched");
        let _ = self
            .inner
            .events
            .send(NotificationEvent::Platform(notification));
        true
    }

    pub async fn permission(&self) -> Permission {
        *self.inner.permission.read().await
    }

    pub async fn set_permission(&self, permission: Permission) {
        let previous = {
            let mut current = self.inner.permission.write().await;
            std::mem::replace(&mut *current, permission)
        };

        if previous == permission {
            return;
        }

        tracing::info!(?previous, ?permission, "Notification permission changed");
        if permission == Permission::Denied {
            self.toast(
                ToastKind::Info,
                "Notifications disabled",
                "You can turn notifications back on in your browser settings.",
            )
            .await;
        }
    }

    pub async fn recent_toasts(&self) -> Vec<Toast> {
        self.inner.toasts.lock().await.iter().cloned().collect()
    }

    pub async fn dismiss(&self, id: Uuid) -> bool {
        let removed = {
            let mut toasts = self.inner.toasts.lock().await;
            let before = toasts.len();
            toasts.retain(|t| t.id != id);
            toasts.len() != before
        };

        if removed {
            let _ = self.inner.events.send(NotificationEvent::Dismissed { id });
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_platform_requires_permission() {
        let center = NotificationCenter::new(Permission::Default);
        assert!(!center.platform(PlatformNotification::new("t", "b")).await);

        center.set_permission(Permission::Granted).await;
        assert!(center.platform(PlatformNotification::new("t", "b")).await);
    }

    #[tokio::test]
    async fn test_denied_permission_shows_info_toast() {
        let center = NotificationCenter::new(Permission::Default);
        center.set_permission(Permission::Denied).await;

        let toasts = center.recent_toasts().await;
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].kind, ToastKind::Info);
        assert_eq!(center.permission().await, Permission::Denied);
    }

    #[tokio::test]
    async fn test_toasts_are_capped_and_dismissable() {
        let center = NotificationCenter::new(Permission::Granted);
        for i in 0..(MAX_TOASTS + 5) {
            center.toast(ToastKind::Info, format!("t{i}"), "m").await;
        }
        let toasts = center.recent_toasts().await;
        assert_eq!(toasts.len(), MAX_TOASTS);
        assert_eq!(toasts[0].title, "t5");

        assert!(center.dismiss(toasts[0].id).await);
        assert!(!center.dismiss(toasts[0].id).await);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let center = NotificationCenter::new(Permission::Granted);
        let mut rx = center.subscribe();

        center.toast(ToastKind::Success, "Saved", "ok").await;
        match rx.recv().await.unwrap() {
            NotificationEvent::Toast(t) => assert_eq!(t.title, "Saved"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
