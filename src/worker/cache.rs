use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use tokio::sync::RwLock;

/// A response as stored in a named cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

type Cache = HashMap<String, CachedResponse>;

/// Named caches shared between the proxy and the push handler.
#[derive(Clone, Default)]
pub struct CacheStorage {
    caches: Arc<RwLock<HashMap<String, Cache>>>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the cache if it does not exist yet.
    pub async fn open(&self, name: &str) {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_default();
    }

    pub async fn put(&self, name: &str, key: &str, response: CachedResponse) {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), response);
    }

    pub async fn lookup(&self, name: &str, key: &str) -> Option<CachedResponse> {
        self.caches
            .read()
            .await
            .get(name)
            .and_then(|cache| cache.get(key))
            .cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn delete(&self, name: &str) -> bool {
        self.caches.write().await.remove(name).is_some()
    }

    pub async fn len(&self, name: &str) -> usize {
        self.caches.read().await.get(name).map_or(0, HashMap::len)
    }
}
