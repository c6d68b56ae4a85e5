use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::services::notifier::{NotificationCenter, ToastKind};
use crate::services::reconciler::Reconciler;

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn from_online(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }
}

/// Tracks the connectivity flag. Every reported event is forwarded as-is;
/// there is no debounce.
#[derive(Clone)]
pub struct NetworkMonitor {
    online: Arc<AtomicBool>,
    events: broadcast::Sender<Connectivity>,
}

impl NetworkMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            online: Arc::new(AtomicBool::new(initially_online)),
            events,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Connectivity> {
        self.events.subscribe()
    }

    /// Record a platform connectivity event. Returns whether the flag changed.
    pub fn report(&self, status: Connectivity) -> bool {
        let online = status == Connectivity::Online;
        let previous = self.online.swap(online, Ordering::SeqCst);
        let _ = self.events.send(status);
        previous != online
    }
}

/// React to connectivity events for the lifetime of the session: sync and
/// announce on "online", warn on "offline".
pub fn spawn_transition_listener(
    monitor: &NetworkMonitor,
    reconciler: Reconciler,
    notifier: NotificationCenter,
) -> JoinHandle<()> {
    let mut rx = monitor.subscribe();

    tokio::spawn(async move {
        loop {
            let status = match rx.recv().await {
                Ok(status) => status,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // A dropped "online" would otherwise leave pending work unsynced.
                    tracing::warn!(skipped, "Connectivity listener lagged, reconciling");
                    reconciler.reconcile_all().await;
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match status {
                Connectivity::Online => {
                    tracing::info!("Back online, starting sync");
                    notifier
                        .toast(ToastKind::Success, "Back Online", "Syncing your data...")
                        .await;
                    reconciler.reconcile_all().await;
                }
                Connectivity::Offline => {
                    tracing::warn!("Connection lost");
                    notifier
                        .toast(
                            ToastKind::Warning,
                            "You're offline",
                            "Some features may be limited. Changes will sync when you reconnect.",
                        )
                        .await;
                }
            }
        }
    })
}
