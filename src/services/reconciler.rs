use serde::Serialize;

use crate::db::{KvStore, StoreError, StoreKey};
use crate::models::journal::JournalEntry;
use crate::models::mood::MoodEntry;
use crate::models::queue::{ActionKind, QueuedAction, Reconcilable};
use crate::models::settings::AppSettings;
use crate::services::notifier::{NotificationCenter, ToastKind};

/// Folds pending actions into their canonical collections.
///
/// Each kind is reconciled in its own store transaction. A failure for one
/// kind rolls back only that kind; its pending list is left in place for the
/// next attempt.
#[derive(Clone)]
pub struct Reconciler {
    store: KvStore,
    notifier: NotificationCenter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub synced: usize,
    pub kinds: Vec<KindReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindReport {
    pub kind: ActionKind,
    #[serde(flatten)]
    pub outcome: KindOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum KindOutcome {
    Synced { count: usize },
    Failed { error: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0} is unreadable, leaving pending actions in place")]
    Unreadable(StoreKey),
}

impl SyncReport {
    pub fn failures(&self) -> usize {
        self.kinds
            .iter()
            .filter(|k| matches!(k.outcome, KindOutcome::Failed { .. }))
            .count()
    }
}

impl Reconciler {
    pub fn new(store: KvStore, notifier: NotificationCenter) -> Self {
        Self { store, notifier }
    }

    /// Start a reconciliation without waiting for it.
    pub fn trigger(&self) {
        let reconciler = self.clone();
        tokio::spawn(async move {
            reconciler.reconcile_all().await;
        });
    }

    pub async fn reconcile_all(&self) -> SyncReport {
        let mut synced = 0;
        let mut kinds = Vec::with_capacity(ActionKind::ALL.len());

        for kind in ActionKind::ALL {
            let result = match kind {
                ActionKind::Mood => self.reconcile_collection::<MoodEntry>().await,
                ActionKind::Journal => self.reconcile_collection::<JournalEntry>().await,
                ActionKind::Settings => self.reconcile_settings().await,
            };

            let outcome = match result {
                Ok(count) => {
                    synced += count;
                    KindOutcome::Synced { count }
                }
                Err(e) => {
                    self.store.metrics().record_failed_reconciliation();
                    tracing::error!(
                        kind = kind.as_str(),
                        error = %e,
                        "Reconciliation failed, pending actions kept for retry"
                    );
                    KindOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            kinds.push(KindReport { kind, outcome });
        }

        if synced > 0 {
            tracing::info!(synced, "Sync complete");
            self.notifier
                .toast(
                    ToastKind::Success,
                    "Sync Complete",
                    format!("Synced {} item(s)", synced),
                )
                .await;
        }

        SyncReport { synced, kinds }
    }

    async fn reconcile_collection<T: Reconcilable>(&self) -> Result<usize, ReconcileError> {
        let pending_key = StoreKey::pending(T::KIND);
        let canonical_key = StoreKey::canonical(T::KIND);

        self.store
            .transact(&[pending_key, canonical_key], move |snapshot| {
                let Some(mut canonical) = snapshot.read_list::<T>(canonical_key) else {
                    return Err(ReconcileError::Unreadable(canonical_key));
                };
                let pending: Vec<QueuedAction<T>> = snapshot.read(pending_key);

                let synced = merge_pending(&mut canonical.items, pending);
                if synced > 0 {
                    snapshot.write_list(canonical_key, &canonical);
                }
                snapshot.remove(pending_key);
                Ok(synced)
            })
            .await?
    }

    async fn reconcile_settings(&self) -> Result<usize, ReconcileError> {
        let pending_key = StoreKey::pending(ActionKind::Settings);
        let canonical_key = StoreKey::AppSettings;

        self.store
            .transact(&[pending_key, canonical_key], move |snapshot| {
                let pending: Vec<QueuedAction<AppSettings>> = snapshot.read(pending_key);
                let synced = pending.len();

                // Settings carry no identity: the newest snapshot wins.
                if let Some(latest) = pending.into_iter().max_by_key(|a| a.timestamp) {
                    snapshot.write(canonical_key, &latest.data);
                }
                snapshot.remove(pending_key);
                synced
            })
            .await
            .map_err(ReconcileError::from)
    }
}

/// Append every pending entry not already present by identity. Returns the
/// number of entries added.
pub fn merge_pending<T: Reconcilable>(canonical: &mut Vec<T>, pending: Vec<QueuedAction<T>>) -> usize {
    let mut added = 0;

    for action in pending {
        if action.kind != T::KIND {
            tracing::warn!(
                expected = T::KIND.as_str(),
                found = action.kind.as_str(),
                "Skipping queued action of the wrong kind"
            );
            continue;
        }
        if canonical.iter().any(|existing| existing.same_entry(&action.data)) {
            continue;
        }
        canonical.push(action.data);
        added += 1;
    }

    added
}
