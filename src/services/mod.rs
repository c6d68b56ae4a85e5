pub mod network;
pub mod notifier;
pub mod offline_queue;
pub mod quick_mood;
pub mod reconciler;
pub mod trends;
