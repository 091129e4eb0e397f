//! Request handling and transformation.
//!
//! # Responsibilities
//! - Decide whether a request may be split across backends
//! - Strip hop-by-hop headers before forwarding
//! - Tag every request with a UUID request id
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Splitting needs all three: `split` query flag, allow-listed prefix, POST
//! - A malformed `split` value means "do not split", never an error

use axum::http::{header, HeaderMap, HeaderName, Method, Uri};

/// Request id header set on every inbound request and forwarded.
pub const X_BALANCER_REQUEST_ID: &str = "x-balancer-request-id";

/// Query parameter requesting a split.
pub const SPLIT_QUERY_PARAM: &str = "split";

/// Connection-scoped headers that never cross the proxy.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    HeaderName::from_static("keep-alive"),
];

/// Which requests may be fanned out.
#[derive(Debug, Clone)]
pub struct SplitPolicy {
    routes: Vec<String>,
}

impl SplitPolicy {
    pub fn new(routes: Vec<String>) -> Self {
        Self { routes }
    }

    pub fn can_split(&self, method: &Method, uri: &Uri) -> bool {
        let requested = uri
            .query()
            .and_then(|q| query_value(q, SPLIT_QUERY_PARAM))
            .and_then(parse_bool)
            .unwrap_or(false);
        if !requested {
            return false;
        }

        let path = uri.path();
        *method == Method::POST && self.routes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// First value of `key` in a raw query string.
pub fn query_value<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        (k == key).then_some(v)
    })
}

/// Boolean literals accepted in query strings.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Remove hop-by-hop headers and anything named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in HOP_BY_HOP.iter().chain(named.iter()) {
        headers.remove(name);
    }
}

/// Headers to send to a backend for a proxied HTTP request.
pub fn forwardable_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers
}
