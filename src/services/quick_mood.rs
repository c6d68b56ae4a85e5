use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::models::queue::Action;
use crate::services::offline_queue::OfflineQueue;
use crate::worker::push::{ClientMessage, PushHandler};

/// Move moods logged from notifications into the offline queue. A mood
/// leaves the quick mood store only once the queue has persisted it. Returns
/// how many were imported.
pub async fn import_quick_moods(push: &PushHandler, queue: &OfflineQueue) -> usize {
    let moods = match push.stored_quick_moods().await {
        Ok(moods) => moods,
        Err(e) => {
            tracing::error!(error = %e, "Could not read quick moods");
            return 0;
        }
    };

    let mut imported = Vec::with_capacity(moods.len());
    for mood in moods {
        if queue.enqueue(Action::Mood(mood.clone())).await.persisted {
            imported.push(mood);
        }
    }

    let count = imported.len();
    if let Err(e) = push.acknowledge(imported).await {
        // The moods stay stored and are queued again next time; the merge
        // drops the duplicates.
        tracing::warn!(error = %e, "Could not clear imported quick moods");
    }
    if count > 0 {
        tracing::info!(count, "Imported quick moods");
    }
    count
}

/// Import quick moods as they are broadcast. Draining the store on every
/// message also picks up moods whose broadcast was missed.
pub fn spawn_quick_mood_listener(push: PushHandler, queue: OfflineQueue) -> JoinHandle<()> {
    let mut rx = push.subscribe();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ClientMessage::QuickMoodLog { .. }) => {
                    import_quick_moods(&push, &queue).await;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Quick mood listener lagged");
                    import_quick_moods(&push, &queue).await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::db::{closed_store, memory_store, KvStore, StoreKey};
    use crate::models::mood::MoodEntry;
    use crate::services::network::NetworkMonitor;
    use crate::services::notifier::{NotificationCenter, Permission};
    use crate::services::reconciler::Reconciler;
    use crate::worker::push::WindowClients;

    async fn setup() -> (KvStore, PushHandler, OfflineQueue) {
        let store = memory_store().await;
        let notifier = NotificationCenter::new(Permission::Granted);
        let reconciler = Reconciler::new(store.clone(), notifier.clone());
        let queue = OfflineQueue::new(store.clone(), NetworkMonitor::new(false), reconciler, 100, 500);
        let push = PushHandler::new(store.clone(), notifier, WindowClients::default());
        (store, push, queue)
    }

    #[tokio::test]
    async fn test_import_moves_stored_moods_into_history() {
        let (store, push, queue) = setup().await;
        push.on_notification_click(Some("mood-3"), Utc::now()).await;
        push.on_notification_click(Some("mood-8"), Utc::now()).await;

        assert_eq!(import_quick_moods(&push, &queue).await, 2);
        assert_eq!(import_quick_moods(&push, &queue).await, 0);

        let history: Vec<MoodEntry> = store.load(StoreKey::MoodHistory).await.unwrap();
        let scores: Vec<u8> = history.iter().map(|m| m.mood.value()).collect();
        assert_eq!(scores, vec![3, 8]);
    }

    #[tokio::test]
    async fn test_listener_imports_broadcast_moods() {
        let (store, push, queue) = setup().await;
        let handle = spawn_quick_mood_listener(push.clone(), queue);
        tokio::task::yield_now().await;

        push.on_notification_click(Some("mood-6"), Utc::now()).await;

        let mut history: Vec<MoodEntry> = Vec::new();
        let mut stored = Vec::new();
        for _ in 0..50 {
            history = store.load(StoreKey::MoodHistory).await.unwrap();
            stored = push.stored_quick_moods().await.unwrap();
            if !history.is_empty() && stored.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].mood.value(), 6);
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_startup_import_picks_up_moods_from_before_restart() {
        let (store, push, _) = setup().await;
        push.on_notification_click(Some("mood-4"), Utc::now()).await;

        let notifier = NotificationCenter::new(Permission::Granted);
        let reconciler = Reconciler::new(store.clone(), notifier.clone());
        let queue = OfflineQueue::new(store.clone(), NetworkMonitor::new(false), reconciler, 100, 500);
        let restarted = PushHandler::new(store.clone(), notifier, WindowClients::default());

        assert_eq!(import_quick_moods(&restarted, &queue).await, 1);
        let history: Vec<MoodEntry> = store.load(StoreKey::MoodHistory).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].mood.value(), 4);
    }

    #[tokio::test]
    async fn test_moods_stay_stored_when_queue_cannot_persist() {
        let (_, push, _) = setup().await;
        push.on_notification_click(Some("mood-5"), Utc::now()).await;

        let broken = closed_store();
        let notifier = NotificationCenter::new(Permission::Granted);
        let reconciler = Reconciler::new(broken.clone(), notifier);
        let queue = OfflineQueue::new(broken, NetworkMonitor::new(false), reconciler, 100, 500);

        assert_eq!(import_quick_moods(&push, &queue).await, 0);
        assert_eq!(push.stored_quick_moods().await.unwrap().len(), 1);
    }
}
