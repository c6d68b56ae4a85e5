use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod config;
mod db;
mod error;
mod handlers;
mod models;
mod services;
mod worker;

use config::Config;
use db::{KvStore, StoreMetrics};
use services::network::{spawn_transition_listener, NetworkMonitor};
use services::notifier::{NotificationCenter, Permission};
use services::offline_queue::OfflineQueue;
use services::quick_mood::{import_quick_moods, spawn_quick_mood_listener};
use services::reconciler::Reconciler;
use services::trends::TrendNotifier;
use worker::cache::CacheStorage;
use worker::fetcher::HttpFetcher;
use worker::proxy::CacheProxy;
use worker::push::{PushHandler, WindowClients};

#[derive(Clone)]
pub struct AppState {
    pub store: KvStore,
    pub config: Arc<Config>,
    pub notifier: NotificationCenter,
    pub network: NetworkMonitor,
    pub queue: OfflineQueue,
    pub reconciler: Reconciler,
    pub trends: TrendNotifier,
    pub proxy: Arc<CacheProxy<HttpFetcher>>,
    pub push: PushHandler,
}

impl AppState {
    /// Wire every component around one store and one notification center.
    pub fn new(store: KvStore, config: Arc<Config>, online: bool) -> anyhow::Result<Self> {
        let notifier = NotificationCenter::new(Permission::Default);
        let network = NetworkMonitor::new(online);
        let reconciler = Reconciler::new(store.clone(), notifier.clone());
        let queue = OfflineQueue::new(
            store.clone(),
            network.clone(),
            reconciler.clone(),
            config.queue_capacity,
            config.interaction_log_capacity,
        );
        let trends = TrendNotifier::new(store.clone(), notifier.clone());

        let fetcher = HttpFetcher::new(config.upstream_origin.clone())?;
        let proxy = Arc::new(CacheProxy::new(
            fetcher,
            CacheStorage::new(),
            config.cache_name.clone(),
            config.upstream_origin.clone(),
        ));
        let push = PushHandler::new(store.clone(), notifier.clone(), WindowClients::default());

        Ok(Self {
            store,
            config,
            notifier,
            network,
            queue,
            reconciler,
            trends,
            proxy,
            push,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "melodica_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env());

    // Store
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Store migrations applied");
    let store = KvStore::spawn(pool, Arc::new(StoreMetrics::new()));

    let state = AppState::new(store, config.clone(), true)?;

    // Background listeners live for the whole process.
    spawn_transition_listener(&state.network, state.reconciler.clone(), state.notifier.clone());
    spawn_quick_mood_listener(state.push.clone(), state.queue.clone());
    import_quick_moods(&state.push, &state.queue).await;

    if state.network.is_online() {
        let report = state.reconciler.reconcile_all().await;
        tracing::info!(synced = report.synced, failures = report.failures(), "Startup sync finished");
    }

    let _trend_task = state.trends.clone().spawn(config.trend_interval);

    if config.worker_enabled() {
        let proxy = state.proxy.clone();
        tokio::spawn(async move {
            if let Err(e) = proxy.start().await {
                tracing::error!(error = %e, "Cache proxy failed to start");
            }
        });
    } else {
        tracing::info!(host = %config.public_host, "Cache proxy not registered on this host");
    }

    let app = router(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    let config = state.config.clone();

    let api_routes = Router::new()
        // Moods & journals
        .route("/api/moods", get(handlers::moods::list_moods))
        .route("/api/moods", post(handlers::moods::log_mood))
        .route("/api/journals", get(handlers::journals::list_journals))
        .route("/api/journals", post(handlers::journals::save_journal))
        // Settings & tier
        .route("/api/settings", get(handlers::settings::get_settings))
        .route("/api/settings", put(handlers::settings::update_settings))
        .route("/api/subscription", get(handlers::settings::get_subscription))
        .route("/api/subscription", put(handlers::settings::update_subscription))
        // Sync
        .route("/api/interactions", get(handlers::sync::list_interactions))
        .route("/api/network", post(handlers::sync::report_network))
        .route("/api/sync", post(handlers::sync::sync_now))
        // Trends
        .route("/api/trends", get(handlers::trends::get_trends))
        .route("/api/trends/run", post(handlers::trends::run_trends))
        // Notifications
        .route(
            "/api/notifications",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/api/notifications/:id",
            delete(handlers::notifications::dismiss_notification),
        )
        .route(
            "/api/notifications/permission",
            put(handlers::notifications::set_permission),
        )
        .route("/api/push", post(handlers::push::receive_push))
        .route("/api/push/click", post(handlers::push::notification_click));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .route("/ws", get(handlers::ws::ws_handler));

    let allowed_origins: Vec<axum::http::HeaderValue> = std::iter::once(&config.frontend_url)
        .chain(config.cors_extra_origins.iter())
        .filter_map(|o| o.parse::<axum::http::HeaderValue>().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(true);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .fallback(handlers::proxy::fallback)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_app() -> (AppState, Router) {
        let store = db::memory_store().await;
        let state = AppState::new(store, Arc::new(Config::for_tests()), false).unwrap();
        (state.clone(), router(state))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (_, app) = test_app().await;
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "melodica-api");
    }

    #[tokio::test]
    async fn test_readyz_reports_store_and_worker() {
        let (_, app) = test_app().await;
        let (status, body) = send(&app, Method::GET, "/readyz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["store"], "ok");
        assert_eq!(body["checks"]["worker"], "parsed");
        assert_eq!(body["metrics"]["corrupt_reads"], 0);
    }

    #[tokio::test]
    async fn test_logged_mood_is_readable_while_offline() {
        let (_, app) = test_app().await;
        let (status, body) = send(&app, Method::POST, "/api/moods", Some(json!({ "mood": 6 }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["queue"]["sync_triggered"], false);

        let (status, body) = send(&app, Method::GET, "/api/moods", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["mood"], 6);
    }

    #[tokio::test]
    async fn test_out_of_range_mood_is_rejected() {
        let (_, app) = test_app().await;
        let (status, body) = send(&app, Method::POST, "/api/moods", Some(json!({ "mood": 11 }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], 422);
    }

    #[tokio::test]
    async fn test_settings_apply_after_sync() {
        let (_, app) = test_app().await;
        let (status, _) = send(
            &app,
            Method::PUT,
            "/api/settings",
            Some(json!({ "notificationFrequency": "daily", "theme": "dark" })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (_, body) = send(&app, Method::GET, "/api/settings", None).await;
        assert_ne!(body["theme"], "dark");

        let (status, report) = send(&app, Method::POST, "/api/sync", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["synced"], 1);

        let (_, body) = send(&app, Method::GET, "/api/settings", None).await;
        assert_eq!(body["theme"], "dark");
        assert_eq!(body["notificationFrequency"], "daily");
    }

    #[tokio::test]
    async fn test_subscription_round_trip() {
        let (_, app) = test_app().await;
        let (_, body) = send(&app, Method::GET, "/api/subscription", None).await;
        assert_eq!(body["tier"], "free");

        let (status, body) = send(&app, Method::PUT, "/api/subscription", Some(json!({ "tier": "pro" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["entitlements"]["mood_trend_alerts"], true);

        let (_, body) = send(&app, Method::GET, "/api/trends", None).await;
        assert_eq!(body["entitled"], true);
        assert!(body["report"].is_null());
    }

    #[tokio::test]
    async fn test_huge_days_window_on_unlimited_tier() {
        let (_, app) = test_app().await;
        send(&app, Method::PUT, "/api/subscription", Some(json!({ "tier": "pro" }))).await;
        send(&app, Method::POST, "/api/moods", Some(json!({ "mood": 7 }))).await;

        for days in ["1000000000", "9223372036854775807", "-5"] {
            let uri = format!("/api/moods?days={days}");
            let (status, body) = send(&app, Method::GET, &uri, None).await;
            assert_eq!(status, StatusCode::OK, "days={days}");
            assert_eq!(body.as_array().unwrap().len(), 1, "days={days}");
        }
    }

    #[tokio::test]
    async fn test_network_report_changes_flag() {
        let (state, app) = test_app().await;
        let (_, body) = send(&app, Method::POST, "/api/network", Some(json!({ "online": true }))).await;
        assert_eq!(body["changed"], true);
        assert!(state.network.is_online());
    }

    #[tokio::test]
    async fn test_dismiss_unknown_notification_is_not_found() {
        let (_, app) = test_app().await;
        let uri = format!("/api/notifications/{}", uuid::Uuid::new_v4());
        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_push_click_logs_quick_mood() {
        let (state, app) = test_app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/push/click",
            Some(json!({ "action": "mood-5" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "mood_logged");
        assert_eq!(state.push.stored_quick_moods().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_push_respects_permission() {
        let (_, app) = test_app().await;
        let (_, body) = send(&app, Method::POST, "/api/push", Some(json!({}))).await;
        assert_eq!(body["shown"], false);

        send(
            &app,
            Method::PUT,
            "/api/notifications/permission",
            Some(json!({ "permission": "granted" })),
        )
        .await;
        let (_, body) = send(&app, Method::POST, "/api/push", Some(json!({ "title": "Hi" }))).await;
        assert_eq!(body["shown"], true);
    }
}
