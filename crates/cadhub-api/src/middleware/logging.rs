//! Access log for the gateway.

use std::time::Instant;

use axum::extract::Request;
use axum::http::header::CONTENT_LENGTH;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, info, warn};

/// Health checks are polled constantly; they log at debug level.
const QUIET_PATHS: &[&str] = &["/", "/health"];

/// One line per request: method, path, upload size, status, latency.
pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let upload_bytes = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if response.status().is_server_error() {
        warn!(%method, %path, status, elapsed_ms, upload_bytes, "Request failed");
    } else if QUIET_PATHS.contains(&path.as_str()) {
        debug!(%method, %path, status, elapsed_ms, "Probe");
    } else {
        info!(%method, %path, status, elapsed_ms, upload_bytes, "Request");
    }

    response
}
