use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::worker::fetcher::{ProxyRequest, ProxyResponse};
use crate::AppState;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Everything outside the API goes through the cache proxy.
pub async fn fallback(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting proxied request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response();
        }
    };

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let proxied = ProxyRequest {
        mode: ProxyRequest::detect_mode(&parts.method, &parts.headers),
        url: format!(
            "{}{}",
            state.config.upstream_origin.trim_end_matches('/'),
            path
        ),
        method: parts.method,
        headers: parts.headers,
        body,
    };

    into_response(state.proxy.handle(proxied).await)
}

fn into_response(response: ProxyResponse) -> Response {
    let mut out = Response::new(Body::from(response.body));
    *out.status_mut() = response.status;
    *out.headers_mut() = response.headers;
    out
}
