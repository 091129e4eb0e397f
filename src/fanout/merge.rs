//! Fan-in of split responses.
//!
//! # Responsibilities
//! - Union `results` arrays and `errors` objects of successful branches
//! - Rebuild `meta` from the first branch with every branch's request id
//! - Join tracked headers and keep one coherent rate-limit header set
//!
//! # Design Decisions
//! - Branches merge in completion order; nothing is re-sorted
//! - One undecodable successful branch fails the whole merge
//! - Rate-limit headers are copied as a set, never mixed across branches

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::fanout::dispatch::BackendResponse;

/// Key inside `meta` carrying the backend request id.
pub const REQUEST_ID_META_KEY: &str = "x_request_id";

/// Headers whose values are joined across branches.
pub const TRACKED_HEADERS: [&str; 5] = [
    "x-process-time",
    "x-instance-id",
    "x-process-pid",
    "x-parent-process-pid",
    "x-request-id",
];

pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Copied together from the branch with the smallest reset.
pub const RATE_LIMIT_HEADERS: [&str; 4] = [
    "x-ratelimit-limit",
    "x-ratelimit-remaining",
    RATE_LIMIT_RESET,
    "retry-after",
];

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("failed to decode response from {backend}: {source}")]
    Decode {
        backend: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no backend answered successfully")]
    NoSuccessfulBranch,
}

/// The single answer built from every branch.
#[derive(Debug, Clone)]
pub struct MergedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub fn merge_responses(branches: Vec<BackendResponse>) -> Result<MergedResponse, MergeError> {
    let mut results: Vec<Value> = Vec::new();
    let mut errors: Map<String, Value> = Map::new();
    let mut meta: Option<Map<String, Value>> = None;
    let mut request_ids: Vec<Value> = Vec::new();
    let mut tracked: Vec<Vec<String>> = vec![Vec::new(); TRACKED_HEADERS.len()];
    let mut rate_limit: Option<(f64, HeaderMap)> = None;
    let mut status = None;

    for branch in branches.into_iter().filter(BackendResponse::is_mergeable) {
        status = Some(branch.status);

        let payload: Value = serde_json::from_slice(&branch.body).map_err(|source| MergeError::Decode {
            backend: branch.backend.clone(),
            source,
        })?;

        if let Some(branch_meta) = payload.get("meta").and_then(Value::as_object) {
            request_ids.push(
                branch_meta
                    .get(REQUEST_ID_META_KEY)
                    .cloned()
                    .unwrap_or(Value::Null),
            );
            if meta.is_none() {
                let mut base = branch_meta.clone();
                base.remove(REQUEST_ID_META_KEY);
                meta = Some(base);
            }
        }

        if let Some(items) = payload.get("results").and_then(Value::as_array) {
            results.extend(items.iter().cloned());
        }

        if let Some(branch_errors) = payload.get("errors").and_then(Value::as_object) {
            for (key, value) in branch_errors {
                errors.insert(key.clone(), value.clone());
            }
        }

        for (values, name) in tracked.iter_mut().zip(TRACKED_HEADERS) {
            if let Some(value) = header_str(&branch.headers, name) {
                values.push(value.to_string());
            }
        }

        if let Some(reset) = header_str(&branch.headers, RATE_LIMIT_RESET).and_then(|v| v.trim().parse::<f64>().ok()) {
            let smaller = rate_limit.as_ref().map_or(true, |(kept, _)| reset < *kept);
            if smaller {
                rate_limit = Some((reset, rate_limit_set(&branch.headers)));
            }
        }
    }

    let status = status.ok_or(MergeError::NoSuccessfulBranch)?;

    let mut headers = HeaderMap::new();
    for (values, name) in tracked.iter().zip(TRACKED_HEADERS) {
        if values.is_empty() {
            continue;
        }
        if let Ok(joined) = HeaderValue::from_str(&values.join(", ")) {
            headers.insert(HeaderName::from_static(name), joined);
        }
    }
    if let Some((_, set)) = rate_limit {
        headers.extend(set);
    }

    let mut meta = meta.unwrap_or_default();
    meta.insert(REQUEST_ID_META_KEY.to_string(), Value::Array(request_ids));

    Ok(MergedResponse {
        status,
        headers,
        body: json!({
            "errors": errors,
            "results": results,
            "meta": meta,
        }),
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn rate_limit_set(source: &HeaderMap) -> HeaderMap {
    let mut set = HeaderMap::new();
    for name in RATE_LIMIT_HEADERS {
        if let Some(value) = source.get(name) {
            set.insert(HeaderName::from_static(name), value.clone());
        }
    }
    set
}
