mod keys;
mod metrics;
mod pool;
mod record;
mod store;

pub use keys::StoreKey;
pub use metrics::StoreMetrics;
pub use pool::create_pool;
#[cfg(test)]
pub use pool::create_memory_pool;
pub use store::{KvStore, Snapshot};
#[cfg(test)]
pub use store::{closed_store, get_raw, memory_store, memory_store_with_pool, put_raw};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store actor is no longer running")]
    Closed,
}
