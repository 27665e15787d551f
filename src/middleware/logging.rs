//! Request correlation and request/response logging

use axum::{body::Body, extract::Request, middleware::Next, response::Response};
use std::time::{Duration, Instant};
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Generates a UUID v4 for every request lacking an `x-request-id`
#[derive(Clone, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        Uuid::new_v4()
            .to_string()
            .parse()
            .ok()
            .map(RequestId::new)
    }
}

/// Log every request with method, path, status and latency inside a span
/// carrying the request id.
pub async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    async move {
        let started = Instant::now();
        let response = next.run(request).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        let status = response.status().as_u16();

        if response.status().is_server_error() {
            warn!(status, latency_ms, "request failed");
        } else {
            info!(status, latency_ms, "request completed");
        }

        response
    }
    .instrument(span)
    .await
}

/// Record the outcome of a call to a downstream rail or service
pub fn log_external_call(service: &str, endpoint: &str, status: Option<u16>, elapsed: Duration) {
    let elapsed_ms = elapsed.as_millis() as u64;
    match status {
        Some(code) if (200..300).contains(&code) => {
            info!(service, endpoint, status = code, elapsed_ms, "external call succeeded")
        }
        Some(code) => {
            warn!(service, endpoint, status = code, elapsed_ms, "external call returned error")
        }
        None => warn!(service, endpoint, elapsed_ms, "external call failed without response"),
    }
}
