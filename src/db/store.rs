//! Single-writer key-value store.
//!
//! One task owns the pool and applies jobs in arrival order. A job declares
//! the keys it needs, gets them in a [`Snapshot`], and stages writes that are
//! committed in the same SQLite transaction. Two jobs never interleave, so a
//! read-modify-write over several keys is atomic.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot};

use super::keys::StoreKey;
use super::metrics::StoreMetrics;
use super::record;
use super::StoreError;

const COMMAND_BUFFER: usize = 256;

type Job = Box<dyn FnOnce(&mut Snapshot) + Send>;

enum Command {
    Transact {
        keys: Vec<StoreKey>,
        job: Job,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    Ping {
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
}

#[derive(Clone)]
pub struct KvStore {
    tx: mpsc::Sender<Command>,
    metrics: Arc<StoreMetrics>,
}

/// The values of the declared keys at the start of a job, plus staged writes.
pub struct Snapshot {
    values: HashMap<StoreKey, Option<String>>,
    writes: Vec<(StoreKey, Option<String>)>,
    metrics: Arc<StoreMetrics>,
}

impl KvStore {
    pub fn spawn(pool: SqlitePool, metrics: Arc<StoreMetrics>) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(run_actor(pool, rx, metrics.clone()));
        Self { tx, metrics }
    }

    pub fn metrics(&self) -> &Arc<StoreMetrics> {
        &self.metrics
    }

    /// Run `f` against the current values of `keys` and commit whatever it
    /// staged. Nothing is written if the transaction fails.
    pub async fn transact<R, F>(&self, keys: &[StoreKey], f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Snapshot) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::new(move |snapshot: &mut Snapshot| {
            let _ = result_tx.send(f(snapshot));
        });

        let (reply, committed) = oneshot::channel();
        self.tx
            .send(Command::Transact {
                keys: keys.to_vec(),
                job,
                reply,
            })
            .await
            .map_err(|_| StoreError::Closed)?;

        committed.await.map_err(|_| StoreError::Closed)??;
        result_rx.await.map_err(|_| StoreError::Closed)
    }

    pub async fn load<T>(&self, key: StoreKey) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Default + Send + 'static,
    {
        self.transact(&[key], move |snapshot| snapshot.read(key)).await
    }

    pub async fn save<T>(&self, key: StoreKey, value: T) -> Result<(), StoreError>
    where
        T: Serialize + Send + 'static,
    {
        self.transact(&[key], move |snapshot| snapshot.write(key, &value))
            .await
    }

    /// Readable elements of a stored list. An unreadable list is empty.
    pub async fn load_list<T>(&self, key: StoreKey) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.transact(&[key], move |snapshot| {
            snapshot
                .read_list(key)
                .map(|list| list.items)
                .unwrap_or_default()
        })
        .await
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let (reply, done) = oneshot::channel();
        self.tx
            .send(Command::Ping { reply })
            .await
            .map_err(|_| StoreError::Closed)?;
        done.await.map_err(|_| StoreError::Closed)?
    }
}

impl Snapshot {
    /// Decode a declared key. Missing, malformed and undeclared keys all read
    /// as `T::default()`.
    pub fn read<T: DeserializeOwned + Default>(&self, key: StoreKey) -> T {
        self.read_opt(key).unwrap_or_default()
    }

    pub fn read_opt<T: DeserializeOwned>(&self, key: StoreKey) -> Option<T> {
        match self.decode(key) {
            Decoded::Value(value) => Some(value),
            Decoded::Missing | Decoded::Unreadable => None,
        }
    }

    /// Decode a list one element at a time. Elements that fail to decode are
    /// counted and carried along untouched so a later write keeps them.
    /// Returns `None` when the list as a whole cannot be read.
    pub fn read_list<T: DeserializeOwned>(&self, key: StoreKey) -> Option<CanonicalList<T>> {
        let raw: Vec<Value> = match self.decode(key) {
            Decoded::Value(raw) => raw,
            Decoded::Missing => return Some(CanonicalList::default()),
            Decoded::Unreadable => return None,
        };

        let mut list = CanonicalList::default();
        for element in raw {
            match serde_json::from_value::<T>(element.clone()) {
                Ok(item) => list.items.push(item),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping unreadable list element");
                    list.skipped.push(element);
                }
            }
        }
        if !list.skipped.is_empty() {
            self.metrics.record_skipped_items(list.skipped.len());
        }
        Some(list)
    }

    fn decode<T: DeserializeOwned>(&self, key: StoreKey) -> Decoded<T> {
        let raw = match self.values.get(&key) {
            Some(Some(raw)) => raw,
            Some(None) => return Decoded::Missing,
            None => {
                tracing::warn!(key = %key, "Read of undeclared key in store job");
                return Decoded::Missing;
            }
        };

        match record::decode(raw) {
            Ok(value) => Decoded::Value(value),
            Err(e) => {
                self.metrics.record_corrupt_read();
                tracing::warn!(key = %key, error = %e, "Discarding unreadable record");
                Decoded::Unreadable
            }
        }
    }

    pub fn write<T: Serialize>(&mut self, key: StoreKey, value: &T) {
        match record::encode(value) {
            Ok(raw) => {
                self.values.insert(key, Some(raw.clone()));
                self.writes.push((key, Some(raw)));
            }
            Err(e) => {
                self.metrics.record_failed_write();
                tracing::error!(key = %key, error = %e, "Failed to encode record, write dropped");
            }
        }
    }

    /// Write a list read with [`Snapshot::read_list`], skipped elements last.
    pub fn write_list<T: Serialize>(&mut self, key: StoreKey, list: &CanonicalList<T>) {
        let mut out = Vec::with_capacity(list.items.len() + list.skipped.len());
        for item in &list.items {
            match serde_json::to_value(item) {
                Ok(value) => out.push(value),
                Err(e) => {
                    self.metrics.record_failed_write();
                    tracing::error!(key = %key, error = %e, "Failed to encode list element, write dropped");
                    return;
                }
            }
        }
        out.extend(list.skipped.iter().cloned());
        self.write(key, &out);
    }

    pub fn remove(&mut self, key: StoreKey) {
        self.values.insert(key, None);
        self.writes.push((key, None));
    }
}

enum Decoded<T> {
    Missing,
    Value(T),
    Unreadable,
}

/// A stored list split into the elements this build understands and the
/// raw elements it does not.
#[derive(Debug)]
pub struct CanonicalList<T> {
    pub items: Vec<T>,
    skipped: Vec<Value>,
}

impl<T> Default for CanonicalList<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

async fn run_actor(pool: SqlitePool, mut rx: mpsc::Receiver<Command>, metrics: Arc<StoreMetrics>) {
    tracing::debug!("Store actor started");

    while let Some(command) = rx.recv().await {
        match command {
            Command::Transact { keys, job, reply } => {
                let result = apply(&pool, &metrics, keys, job).await;
                if let Err(e) = &result {
                    metrics.record_failed_write();
                    tracing::error!(error = %e, "Store transaction failed");
                }
                let _ = reply.send(result);
            }
            Command::Ping { reply } => {
                let result = sqlx::query_scalar::<_, i32>("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .map(|_| ())
                    .map_err(StoreError::from);
                let _ = reply.send(result);
            }
        }
    }

    tracing::debug!("Store actor stopped");
}

async fn apply(
    pool: &SqlitePool,
    metrics: &Arc<StoreMetrics>,
    keys: Vec<StoreKey>,
    job: Job,
) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;

    let mut values = HashMap::with_capacity(keys.len());
    for key in keys {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key.as_key())
            .fetch_optional(&mut *tx)
            .await?;
        values.insert(key, value);
    }

    let mut snapshot = Snapshot {
        values,
        writes: Vec::new(),
        metrics: metrics.clone(),
    };
    job(&mut snapshot);

    let updated_at = Utc::now().to_rfc3339();
    for (key, value) in snapshot.writes {
        match value {
            Some(value) => {
                sqlx::query(
                    r#"
                    INSERT INTO kv_store (key, value, updated_at)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT (key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(key.as_key())
                .bind(value)
                .bind(&updated_at)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM kv_store WHERE key = ?1")
                    .bind(key.as_key())
                    .execute(&mut *tx)
                    .await?;
            }
        }
    }

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
pub async fn memory_store() -> KvStore {
    memory_store_with_pool().await.0
}

/// The store plus a handle on its pool, for tests that need raw SQL.
#[cfg(test)]
pub async fn memory_store_with_pool() -> (KvStore, SqlitePool) {
    let pool = super::create_memory_pool().await;
    let store = KvStore::spawn(pool.clone(), Arc::new(StoreMetrics::new()));
    (store, pool)
}

/// A store whose actor is gone: every call fails with `Closed`.
#[cfg(test)]
pub fn closed_store() -> KvStore {
    let (tx, _) = mpsc::channel(1);
    KvStore {
        tx,
        metrics: Arc::new(StoreMetrics::new()),
    }
}

/// The raw stored text of a key.
#[cfg(test)]
pub async fn get_raw(store: &KvStore, key: StoreKey) -> Option<String> {
    store
        .transact(&[key], move |snapshot| snapshot.values.get(&key).cloned().flatten())
        .await
        .unwrap()
}

/// Write a raw value, bypassing the envelope. Used to simulate legacy or
/// corrupted records.
#[cfg(test)]
pub async fn put_raw(store: &KvStore, key: StoreKey, raw: &str) {
    let raw = raw.to_string();
    store
        .transact(&[key], move |snapshot| {
            snapshot.values.insert(key, Some(raw.clone()));
            snapshot.writes.push((key, Some(raw)));
        })
        .await
        .unwrap();
}
