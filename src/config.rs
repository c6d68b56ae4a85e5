use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::models::interaction::DEFAULT_INTERACTION_LOG_CAPACITY;
use crate::services::offline_queue::DEFAULT_QUEUE_CAPACITY;
use crate::services::trends::DEFAULT_INTERVAL;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub cors_extra_origins: Vec<String>,

    // Cache proxy
    pub upstream_origin: String,
    pub public_host: String,
    pub production_hosts: Vec<String>,
    pub cache_name: String,

    pub queue_capacity: usize,
    pub interaction_log_capacity: usize,
    pub trend_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://melodica.db".into()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_or("PORT", 8080),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            cors_extra_origins: list("CORS_EXTRA_ORIGINS"),

            upstream_origin: env::var("UPSTREAM_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            public_host: env::var("PUBLIC_HOST").unwrap_or_else(|_| "localhost".into()),
            production_hosts: list("PRODUCTION_HOSTS"),
            cache_name: env::var("CACHE_NAME").unwrap_or_else(|_| "melodica-v1".into()),

            queue_capacity: parse_or("QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY),
            interaction_log_capacity: parse_or(
                "INTERACTION_LOG_CAPACITY",
                DEFAULT_INTERACTION_LOG_CAPACITY,
            ),
            trend_interval: trend_interval(parse_or(
                "TREND_INTERVAL_SECS",
                DEFAULT_INTERVAL.as_secs(),
            )),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The cache proxy is only registered on production hosts.
    pub fn worker_enabled(&self) -> bool {
        self.production_hosts
            .iter()
            .any(|h| h.eq_ignore_ascii_case(&self.public_host))
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparseable config value");
            default
        }),
        Err(_) => default,
    }
}

fn trend_interval(secs: u64) -> Duration {
    if secs == 0 {
        tracing::warn!("TREND_INTERVAL_SECS must be positive, using the default");
        return DEFAULT_INTERVAL;
    }
    Duration::from_secs(secs)
}

fn list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|raw| split_list(&raw))
        .unwrap_or_default()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            host: "127.0.0.1".into(),
            port: 0,
            frontend_url: "http://localhost:3000".into(),
            cors_extra_origins: Vec::new(),
            upstream_origin: "http://app.test".into(),
            public_host: "localhost".into(),
            production_hosts: Vec::new(),
            cache_name: "melodica-test".into(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            interaction_log_capacity: DEFAULT_INTERACTION_LOG_CAPACITY,
            trend_interval: DEFAULT_INTERVAL,
        }
    }
}
