//! Request logging middleware.
//!
//! Tags every request with a fresh id, echoed as `x-request-id`. The
//! handler runs inside a `request` span carrying that id; method, path,
//! content type, status and latency are logged once the response is ready.

use std::time::Instant;

use axum::http::{header, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

/// Response header echoing the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub async fn log_request(req: Request<axum::body::Body>, next: Next) -> Response {
    let id = Uuid::new_v4();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .unwrap_or_default();

    let span = tracing::info_span!("request", id = %id);
    let started = Instant::now();

    let mut response = next.run(req).instrument(span.clone()).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    span.in_scope(|| {
        if response.status().is_server_error() {
            tracing::warn!(%method, %path, %content_type, status, elapsed_ms, "Request failed");
        } else {
            tracing::info!(%method, %path, %content_type, status, elapsed_ms, "Request served");
        }
    });

    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
