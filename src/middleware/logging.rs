//! Request logging middleware.
//!
//! Grounded directly on `middleware/logging.rs`'s `request_logging_simple`:
//! a span-free before/after timing wrapper that skips `/health` to keep
//! liveness polling out of the log stream.

use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{info, warn};

pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if path == "/health" {
        return next.run(request).await;
    }

    let start = Instant::now();
    let response = next.run(request).await;
    let latency = start.elapsed();
    let status = response.status().as_u16();

    if status >= 500 {
        warn!(%method, %path, status, latency_ms = latency.as_millis() as u64, "request failed");
    } else {
        info!(%method, %path, status, latency_ms = latency.as_millis() as u64, "request completed");
    }

    response
}
