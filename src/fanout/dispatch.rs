//! Outbound backend requests.
//!
//! # Responsibilities
//! - Rewrite the inbound URI onto a backend base URL
//! - Forward method, filtered headers and a buffered body
//! - Retry while the backend answers 503, then keep whatever came last
//! - Buffer the backend response so it can be merged
//!
//! # Design Decisions
//! - Bodies are `Bytes` so a retry re-sends without copying
//! - Only 503 is retried; transport errors surface to the caller at once

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use thiserror::Error;

use crate::config::ProxySettings;

pub type HttpClient = Client<HttpConnector, Body>;

/// Shared client used for every backend request.
pub fn build_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid backend URI '{0}'")]
    InvalidUri(String),

    #[error("failed to build backend request: {0}")]
    Build(#[from] axum::http::Error),

    #[error("backend request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read backend response: {0}")]
    Body(#[source] axum::Error),

    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),
}

/// A fully buffered backend answer.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub backend: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BackendResponse {
    /// 200 and 201 are the only statuses that take part in a merge.
    pub fn is_mergeable(&self) -> bool {
        matches!(self.status, StatusCode::OK | StatusCode::CREATED)
    }
}

/// Sends one request to one backend with the 503 retry budget.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: HttpClient,
    max_attempts: u32,
    retry_delay: Duration,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(client: HttpClient, settings: &ProxySettings) -> Self {
        Self {
            client,
            max_attempts: settings.max_attempts.max(1),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            timeout: (settings.backend_timeout_secs > 0)
                .then(|| Duration::from_secs(settings.backend_timeout_secs)),
        }
    }

    /// `base` + the inbound path and query.
    pub fn backend_uri(base: &str, inbound: &Uri) -> Result<Uri, DispatchError> {
        let path = inbound.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let target = format!("{}{}", base.trim_end_matches('/'), path);
        target.parse().map_err(|_| DispatchError::InvalidUri(target))
    }

    pub async fn send(
        &self,
        backend: &str,
        method: &Method,
        inbound: &Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<BackendResponse, DispatchError> {
        let uri = Self::backend_uri(backend, inbound)?;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut request = Request::builder()
                .method(method.clone())
                .uri(uri.clone())
                .body(Body::from(body.clone()))?;
            let outgoing = request.headers_mut();
            for (name, value) in headers {
                if name != header::CONTENT_LENGTH {
                    outgoing.append(name.clone(), value.clone());
                }
            }

            let response = match self.timeout {
                Some(limit) => tokio::time::timeout(limit, self.client.request(request))
                    .await
                    .map_err(|_| DispatchError::Timeout(limit))??,
                None => self.client.request(request).await?,
            };

            let status = response.status();
            if status == StatusCode::SERVICE_UNAVAILABLE && attempt < self.max_attempts {
                tracing::debug!(
                    backend = %backend,
                    attempt,
                    max_attempts = self.max_attempts,
                    "Backend unavailable, retrying"
                );
                tokio::time::sleep(self.retry_delay).await;
                continue;
            }

            let (parts, body) = response.into_parts();
            let body = axum::body::to_bytes(Body::new(body), usize::MAX)
                .await
                .map_err(DispatchError::Body)?;

            return Ok(BackendResponse {
                backend: backend.to_string(),
                status: parts.status,
                headers: parts.headers,
                body,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_uri() {
        let inbound: Uri = "/email/template/?split=true".parse().unwrap();
        assert_eq!(
            Dispatcher::backend_uri("http://127.0.0.1:8080", &inbound).unwrap(),
            "http://127.0.0.1:8080/email/template/?split=true"
        );
        assert_eq!(
            Dispatcher::backend_uri("http://app:8080/", &"/".parse().unwrap()).unwrap(),
            "http://app:8080/"
        );
        assert!(Dispatcher::backend_uri("not a base", &inbound).is_err());
    }

    #[test]
    fn test_timeout_disabled_by_zero() {
        let settings = ProxySettings::default();
        assert!(Dispatcher::new(build_client(), &settings).timeout.is_none());

        let settings = ProxySettings {
            backend_timeout_secs: 3,
            ..ProxySettings::default()
        };
        assert_eq!(
            Dispatcher::new(build_client(), &settings).timeout,
            Some(Duration::from_secs(3))
        );
    }
}
