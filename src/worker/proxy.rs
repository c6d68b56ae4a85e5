//! Network-first cache proxy.
//!
//! Lifecycle mirrors a service worker: install seeds the cache with the app
//! shell and the offline page, activate drops every other cache and starts
//! serving. Until activation every request goes straight to the network.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::http::{Method, StatusCode};
use serde::Serialize;
use tokio::sync::RwLock;

use super::cache::{CacheStorage, CachedResponse};
use super::fetcher::{FetchError, Fetcher, ProxyRequest, ProxyResponse, RequestMode, ResponseKind};

pub const OFFLINE_PAGE: &str = "/offline.html";

/// Resources every install must cache.
pub const PRECACHE: [&str; 5] = [
    "/",
    OFFLINE_PAGE,
    "/manifest.json",
    "/icons/icon-192x192.png",
    "/icons/icon-512x512.png",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("failed to precache {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("precache of {url} returned {status}")]
    BadStatus { url: String, status: StatusCode },

    #[error("cannot {action} from state {state:?}")]
    InvalidState {
        action: &'static str,
        state: WorkerState,
    },
}

pub struct CacheProxy<F> {
    fetcher: F,
    caches: CacheStorage,
    cache_name: String,
    origin: String,
    precache: Vec<String>,
    state: RwLock<WorkerState>,
    clients_claimed: AtomicBool,
}

impl<F: Fetcher> CacheProxy<F> {
    pub fn new(fetcher: F, caches: CacheStorage, cache_name: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            fetcher,
            caches,
            cache_name: cache_name.into(),
            origin: origin.into().trim_end_matches('/').to_string(),
            precache: PRECACHE.iter().map(|p| p.to_string()).collect(),
            state: RwLock::new(WorkerState::Parsed),
            clients_claimed: AtomicBool::new(false),
        }
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.origin, path)
    }

    /// Seed the current cache. A single failed resource fails the install
    /// and leaves the proxy redundant.
    pub async fn install(&self) -> Result<(), InstallError> {
        {
            let mut state = self.state.write().await;
            if *state != WorkerState::Parsed {
                return Err(InstallError::InvalidState {
                    action: "install",
                    state: *state,
                });
            }
            *state = WorkerState::Installing;
        }

        tracing::info!(cache = %self.cache_name, "Installing cache proxy");
        self.caches.open(&self.cache_name).await;

        let mut fetched = Vec::with_capacity(self.precache.len());
        for path in &self.precache {
            let url = self.url_for(path);
            let result = self.fetcher.fetch(&ProxyRequest::get(url.clone())).await;
            match result {
                Ok(response) if response.status == StatusCode::OK => fetched.push((url, response)),
                Ok(response) => {
                    *self.state.write().await = WorkerState::Redundant;
                    return Err(InstallError::BadStatus {
                        url,
                        status: response.status,
                    });
                }
                Err(source) => {
                    *self.state.write().await = WorkerState::Redundant;
                    return Err(InstallError::Fetch { url, source });
                }
            }
        }

        for (url, response) in fetched {
            self.caches.put(&self.cache_name, &url, to_cached(&response)).await;
        }

        *self.state.write().await = WorkerState::Installed;
        tracing::info!(cache = %self.cache_name, "Cache proxy installed");
        Ok(())
    }

    /// Delete stale caches and take over all clients.
    pub async fn activate(&self) -> Result<(), InstallError> {
        {
            let mut state = self.state.write().await;
            if *state != WorkerState::Installed {
                return Err(InstallError::InvalidState {
                    action: "activate",
                    state: *state,
                });
            }
            *state = WorkerState::Activating;
        }

        for name in self.caches.names().await {
            if name != self.cache_name {
                tracing::info!(cache = %name, "Deleting stale cache");
                self.caches.delete(&name).await;
            }
        }

        self.clients_claimed.store(true, Ordering::SeqCst);
        *self.state.write().await = WorkerState::Activated;
        tracing::info!(cache = %self.cache_name, "Cache proxy activated");
        Ok(())
    }

    /// Install, skip waiting, activate.
    pub async fn start(&self) -> Result<(), InstallError> {
        self.install().await?;
        self.activate().await
    }

    pub async fn handle(&self, request: ProxyRequest) -> ProxyResponse {
        if request.method != Method::GET || !is_http(&request.url) {
            return self.passthrough(&request).await;
        }
        if self.state().await != WorkerState::Activated {
            return self.passthrough(&request).await;
        }

        let error = match self.fetcher.fetch(&request).await {
            Ok(response) => {
                if response.status == StatusCode::OK && response.kind == ResponseKind::Basic {
                    self.caches
                        .put(&self.cache_name, &request.url, to_cached(&response))
                        .await;
                }
                return response;
            }
            Err(e) => e,
        };

        tracing::debug!(url = %request.url, error = %error, "Network failed, falling back to cache");

        if let Some(cached) = self.caches.lookup(&self.cache_name, &request.url).await {
            return from_cached(cached);
        }

        if request.mode == RequestMode::Navigate {
            let offline = self.url_for(OFFLINE_PAGE);
            if let Some(cached) = self.caches.lookup(&self.cache_name, &offline).await {
                return from_cached(cached);
            }
        }

        ProxyResponse::synthetic(StatusCode::SERVICE_UNAVAILABLE, "Offline")
    }

    async fn passthrough(&self, request: &ProxyRequest) -> ProxyResponse {
        match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "Upstream request failed");
                ProxyResponse::synthetic(StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
        }
    }
}

// Extension pages and other non-http schemes are never intercepted.
fn is_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn to_cached(response: &ProxyResponse) -> CachedResponse {
    CachedResponse {
        status: response.status,
        headers: response.headers.clone(),
        body: response.body.clone(),
    }
}

fn from_cached(cached: CachedResponse) -> ProxyResponse {
    ProxyResponse {
        status: cached.status,
        headers: cached.headers,
        body: cached.body,
        kind: ResponseKind::Basic,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::HeaderMap;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    const ORIGIN: &str = "http://app.test";

    /// Serves canned bodies by URL; can be switched offline.
    #[derive(Default)]
    pub(crate) struct StubFetcher {
        pub offline: AtomicBool,
        pub pages: Mutex<HashMap<String, (StatusCode, &'static str)>>,
        pub calls: AtomicUsize,
    }

    impl StubFetcher {
        pub fn with_app_shell() -> Self {
            let stub = Self::default();
            {
                let mut pages = stub.pages.lock().unwrap();
                for path in PRECACHE {
                    pages.insert(format!("{ORIGIN}{path}"), (StatusCode::OK, "shell"));
                }
                pages.insert(format!("{ORIGIN}{OFFLINE_PAGE}"), (StatusCode::OK, "offline page"));
            }
            stub
        }

        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn serve(&self, url: &str, status: StatusCode, body: &'static str) {
            self.pages.lock().unwrap().insert(url.to_string(), (status, body));
        }
    }

    impl Fetcher for StubFetcher {
        async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(FetchError::Network("offline".into()));
            }
            let page = self.pages.lock().unwrap().get(&request.url).copied();
            let (status, body) = page.unwrap_or((StatusCode::NOT_FOUND, "missing"));
            Ok(ProxyResponse {
                status,
                headers: HeaderMap::new(),
                body: Bytes::from_static(body.as_bytes()),
                kind: ResponseKind::Basic,
            })
        }
    }

    async fn active_proxy() -> CacheProxy<StubFetcher> {
        let proxy = CacheProxy::new(StubFetcher::with_app_shell(), CacheStorage::new(), "melodica-v2", ORIGIN);
        proxy.start().await.unwrap();
        proxy
    }

    #[tokio::test]
    async fn test_start_precaches_and_activates() {
        let proxy = active_proxy().await;
        assert_eq!(proxy.state().await, WorkerState::Activated);
        assert!(proxy.clients_claimed());
        assert_eq!(proxy.caches.len("melodica-v2").await, PRECACHE.len());
    }

    #[tokio::test]
    async fn test_failed_precache_makes_proxy_redundant() {
        let stub = StubFetcher::default();
        let proxy = CacheProxy::new(stub, CacheStorage::new(), "melodica-v2", ORIGIN);

        let result = proxy.install().await;
        assert!(matches!(result, Err(InstallError::BadStatus { .. })));
        assert_eq!(proxy.state().await, WorkerState::Redundant);
    }

    #[tokio::test]
    async fn test_activate_deletes_stale_caches() {
        let caches = CacheStorage::new();
        caches.open("melodica-v1").await;
        caches.open("melodica-v0").await;

        let proxy = CacheProxy::new(StubFetcher::with_app_shell(), caches.clone(), "melodica-v2", ORIGIN);
        proxy.start().await.unwrap();

        let names = caches.names().await;
        assert!(!names.contains(&"melodica-v1".to_string()));
        assert_eq!(names, vec!["melodica-v2".to_string()]);
    }

    #[tokio::test]
    async fn test_online_response_is_cached_then_served_offline() {
        let proxy = active_proxy().await;
        let url = format!("{ORIGIN}/journal");
        proxy.fetcher.serve(&url, StatusCode::OK, "journal page");

        let live = proxy.handle(ProxyRequest::get(url.clone())).await;
        assert_eq!(live.body, "journal page");

        proxy.fetcher.set_offline(true);
        let cached = proxy.handle(ProxyRequest::get(url)).await;
        assert_eq!(cached.status, StatusCode::OK);
        assert_eq!(cached.body, "journal page");
    }

    #[tokio::test]
    async fn test_non_ok_responses_are_not_cached() {
        let proxy = active_proxy().await;
        let url = format!("{ORIGIN}/missing");

        let live = proxy.handle(ProxyRequest::get(url.clone())).await;
        assert_eq!(live.status, StatusCode::NOT_FOUND);

        proxy.fetcher.set_offline(true);
        let offline = proxy.handle(ProxyRequest::get(url)).await;
        assert_eq!(offline.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_offline_page() {
        let proxy = active_proxy().await;
        proxy.fetcher.set_offline(true);

        let response = proxy
            .handle(ProxyRequest::navigate(format!("{ORIGIN}/never-visited")))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, "offline page");
    }

    #[tokio::test]
    async fn test_offline_asset_gets_503() {
        let proxy = active_proxy().await;
        proxy.fetcher.set_offline(true);

        let response = proxy
            .handle(ProxyRequest::get(format!("{ORIGIN}/app.js")))
            .await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.kind, ResponseKind::Synthetic);
    }

    #[tokio::test]
    async fn test_non_get_passes_through_uncached() {
        let proxy = active_proxy().await;
        let url = format!("{ORIGIN}/api/thing");
        proxy.fetcher.serve(&url, StatusCode::OK, "posted");

        let mut request = ProxyRequest::get(url.clone());
        request.method = Method::POST;
        let response = proxy.handle(request).await;
        assert_eq!(response.body, "posted");
        assert!(proxy.caches.lookup("melodica-v2", &url).await.is_none());
    }

    #[tokio::test]
    async fn test_extension_scheme_is_not_intercepted() {
        let proxy = active_proxy().await;
        proxy.fetcher.set_offline(true);

        let response = proxy
            .handle(ProxyRequest::navigate("chrome-extension://abc/page.html"))
            .await;
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_requests_pass_through_before_activation() {
        let proxy = CacheProxy::new(StubFetcher::with_app_shell(), CacheStorage::new(), "melodica-v2", ORIGIN);
        let url = format!("{ORIGIN}/");

        let response = proxy.handle(ProxyRequest::get(url.clone())).await;
        assert_eq!(response.body, "shell");
        assert_eq!(proxy.caches.len("melodica-v2").await, 0);
    }
}
