//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn buffered backend answers into client responses
//! - Serialize merged split responses as JSON
//! - Stamp every response with the balancer's own processing time
//!
//! # Design Decisions
//! - Hop-by-hop headers stripped from backend answers
//! - Passthrough keeps the backend status, headers and body untouched otherwise

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::time::Instant;

use crate::fanout::dispatch::BackendResponse;
use crate::fanout::merge::MergedResponse;
use crate::http::request::strip_hop_by_hop;

/// Total time spent in the balancer for one request.
pub const X_BALANCER_PROCESS_TIME: &str = "x-balancer-process-time";

/// Formats as `"<ms> (ms)"`.
pub fn process_time_value(start: Instant) -> HeaderValue {
    let millis = start.elapsed().as_millis();
    HeaderValue::from_str(&format!("{} (ms)", millis)).unwrap_or_else(|_| HeaderValue::from_static("0 (ms)"))
}

/// Middleware adding `X-Balancer-Process-Time`.
pub async fn process_time(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(HeaderName::from_static(X_BALANCER_PROCESS_TIME), process_time_value(start));
    response
}

/// A single backend answer, returned as received.
pub fn passthrough(backend: BackendResponse) -> Response {
    let mut response = Response::new(Body::from(backend.body));
    *response.status_mut() = backend.status;
    *response.headers_mut() = backend.headers;
    strip_hop_by_hop(response.headers_mut());
    response
}

/// A merged split answer.
pub fn merged(merged: MergedResponse) -> Response {
    let body = match serde_json::to_vec(&merged.body) {
        Ok(body) => body,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = merged.status;
    *response.headers_mut() = merged.headers;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
