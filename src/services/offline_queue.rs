use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::db::{KvStore, StoreError, StoreKey};
use crate::models::interaction::{append_capped, InteractionEvent};
use crate::models::queue::{Action, ActionKind, QueuedAction, Reconcilable};
use crate::models::settings::AppSettings;
use crate::services::network::NetworkMonitor;
use crate::services::reconciler::Reconciler;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Records user mutations durably and hands them to the reconciler.
///
/// Mood and journal entries are also written to their canonical lists right
/// away so reads reflect the user's own actions regardless of connectivity.
#[derive(Clone)]
pub struct OfflineQueue {
    store: KvStore,
    network: NetworkMonitor,
    reconciler: Reconciler,
    capacity: usize,
    log_capacity: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnqueueOutcome {
    pub persisted: bool,
    pub evicted: usize,
    pub sync_triggered: bool,
}

impl OfflineQueue {
    pub fn new(
        store: KvStore,
        network: NetworkMonitor,
        reconciler: Reconciler,
        capacity: usize,
        log_capacity: usize,
    ) -> Self {
        Self {
            store,
            network,
            reconciler,
            capacity: capacity.max(1),
            log_capacity: log_capacity.max(1),
        }
    }

    pub async fn enqueue(&self, action: Action) -> EnqueueOutcome {
        self.enqueue_at(action, Utc::now()).await
    }

    /// Never fails: a storage error is logged and counted, and the mutation
    /// is lost.
    pub async fn enqueue_at(&self, action: Action, now: DateTime<Utc>) -> EnqueueOutcome {
        let kind = action.kind();

        let result = match action {
            Action::Mood(entry) => {
                let event = InteractionEvent::new("mood_logged", now)
                    .with_detail(json!({ "mood": entry.mood.value() }));
                self.record(entry, now, Some(event)).await
            }
            Action::Journal(entry) => {
                let event = InteractionEvent::new("journal_saved", now)
                    .with_detail(json!({ "id": entry.id }));
                self.record(entry, now, Some(event)).await
            }
            Action::Settings(settings) => self.record_settings(settings, now).await,
        };

        let evicted = match result {
            Ok(evicted) => evicted,
            Err(e) => {
                tracing::error!(kind = kind.as_str(), error = %e, "Failed to record action, mutation lost");
                return EnqueueOutcome::default();
            }
        };

        if evicted > 0 {
            self.store.metrics().record_evictions(evicted);
            tracing::warn!(kind = kind.as_str(), evicted, "Pending queue full, dropped oldest actions");
        }

        let sync_triggered = self.network.is_online();
        if sync_triggered {
            self.reconciler.trigger();
        } else {
            tracing::debug!(kind = kind.as_str(), "Offline, action queued for later sync");
        }

        EnqueueOutcome {
            persisted: true,
            evicted,
            sync_triggered,
        }
    }

    async fn record<T: Reconcilable>(
        &self,
        entry: T,
        now: DateTime<Utc>,
        event: Option<InteractionEvent>,
    ) -> Result<usize, StoreError> {
        let pending_key = StoreKey::pending(T::KIND);
        let canonical_key = StoreKey::canonical(T::KIND);
        let log_key = StoreKey::InteractionLog;
        let capacity = self.capacity;
        let log_capacity = self.log_capacity;

        self.store
            .transact(&[pending_key, canonical_key, log_key], move |snapshot| {
                // An unreadable canonical list is left as is; the pending copy
                // below is applied once the list can be read again.
                match snapshot.read_list::<T>(canonical_key) {
                    Some(mut canonical) => {
                        entry.clone().upsert_into(&mut canonical.items);
                        snapshot.write_list(canonical_key, &canonical);
                    }
                    None => tracing::warn!(
                        key = %canonical_key,
                        "Canonical list unreadable, entry kept in pending only"
                    ),
                }

                let evicted = push_bounded(snapshot, pending_key, T::KIND, entry, now, capacity);

                if let Some(event) = event {
                    let mut log: Vec<InteractionEvent> = snapshot.read(log_key);
                    append_capped(&mut log, event, log_capacity);
                    snapshot.write(log_key, &log);
                }

                evicted
            })
            .await
    }

    async fn record_settings(&self, settings: AppSettings, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let pending_key = StoreKey::pending(ActionKind::Settings);
        let log_key = StoreKey::InteractionLog;
        let capacity = self.capacity;
        let log_capacity = self.log_capacity;

        self.store
            .transact(&[pending_key, log_key], move |snapshot| {
                let evicted =
                    push_bounded(snapshot, pending_key, ActionKind::Settings, settings, now, capacity);

                let mut log: Vec<InteractionEvent> = snapshot.read(log_key);
                append_capped(&mut log, InteractionEvent::new("settings_changed", now), log_capacity);
                snapshot.write(log_key, &log);

                evicted
            })
            .await
    }
}

/// Append to a pending list used as a ring buffer. Returns how many of the
/// oldest actions were evicted.
fn push_bounded<T>(
    snapshot: &mut crate::db::Snapshot,
    key: StoreKey,
    kind: ActionKind,
    data: T,
    now: DateTime<Utc>,
    capacity: usize,
) -> usize
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut pending: VecDeque<QueuedAction<T>> = snapshot.read(key);
    pending.push_back(QueuedAction::new(kind, data, now));

    let mut evicted = 0;
    while pending.len() > capacity {
        pending.pop_front();
        evicted += 1;
    }

    snapshot.write(key, &pending);
    evicted
}
