use std::future::Future;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

/// How a request was made, as far as caching is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Navigate,
    Other,
}

#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Absolute URL of the resource.
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub mode: RequestMode,
}

impl ProxyRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            mode: RequestMode::Other,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// Navigation is signalled by `Sec-Fetch-Mode: navigate`, or by a GET
    /// that prefers HTML when the browser does not send fetch metadata.
    pub fn detect_mode(method: &Method, headers: &HeaderMap) -> RequestMode {
        if let Some(mode) = headers.get("sec-fetch-mode").and_then(|v| v.to_str().ok()) {
            return if mode.eq_ignore_ascii_case("navigate") {
                RequestMode::Navigate
            } else {
                RequestMode::Other
            };
        }

        let wants_html = headers
            .get(axum::http::header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("text/html"));

        if *method == Method::GET && wants_html {
            RequestMode::Navigate
        } else {
            RequestMode::Other
        }
    }
}

/// Same-origin responses are `Basic`; only those are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Basic,
    Cors,
    Synthetic,
}

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub kind: ResponseKind,
}

impl ProxyResponse {
    pub fn synthetic(status: StatusCode, body: &'static str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self {
            status,
            headers,
            body: Bytes::from_static(body.as_bytes()),
            kind: ResponseKind::Synthetic,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// The network side of the proxy.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, request: &ProxyRequest) -> impl Future<Output = Result<ProxyResponse, FetchError>> + Send;
}

/// Fetches from the upstream web app over HTTP.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: reqwest::Url,
}

// Hop-by-hop headers are not forwarded in either direction.
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "host",
];

impl HttpFetcher {
    pub fn new(origin: impl AsRef<str>) -> Result<Self, FetchError> {
        let origin = reqwest::Url::parse(origin.as_ref())
            .map_err(|e| FetchError::InvalidRequest(format!("upstream origin: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        Ok(Self { client, origin })
    }

    /// Scheme, host and port all match the upstream origin.
    pub fn is_same_origin(&self, url: &reqwest::Url) -> bool {
        url.origin() == self.origin.origin()
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, FetchError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in request.headers.iter() {
            if HOP_BY_HOP.contains(&name.as_str()) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_bytes());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.to_vec());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let same_origin = self.is_same_origin(response.url());
        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in response.headers().iter() {
            if HOP_BY_HOP.contains(&name.as_str()) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.append(name, value);
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(ProxyResponse {
            status,
            headers,
            body,
            kind: if same_origin {
                ResponseKind::Basic
            } else {
                ResponseKind::Cors
            },
        })
    }
}
