use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
};
use tracing::Span;

/// trace_span_logger
///
/// Used by `TraceLayer` to open one span per request. Carries the `x-request-id`
/// assigned by `SetRequestIdLayer`, so every event emitted while handling the
/// request (including server failures) is correlated to it.
pub fn trace_span_logger(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        req_id = %request_id,
    )
}

/// log_request
///
/// Emits the single "received request" line before the request is delegated.
pub fn log_request(request: &Request<Body>, _span: &Span) {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    tracing::info!(
        ip = %ip,
        proto = ?request.version(),
        method = %request.method(),
        uri = %request.uri(),
        "received request"
    );
}
