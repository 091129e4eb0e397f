//! Proxy engine: backend choice, fan-out and fan-in.
//!
//! # Data Flow
//! ```text
//! Inbound request (body buffered)
//!     → choose_servers(can_split)
//!         split:     every active backend
//!         otherwise: current algorithm picks one
//!     → split.rs (one body per backend) or original body
//!     → dispatch.rs (one task per branch, 503 retries)
//!     → merge.rs (split) or passthrough
//! ```

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::error::BalancerError;
use crate::fanout::dispatch::{BackendResponse, Dispatcher};
use crate::fanout::merge::merge_responses;
use crate::fanout::split::split_body;
use crate::health::BackendPool;
use crate::http::response;
use crate::load_balancer::AlgorithmRegistry;
use crate::observability::metrics;

pub struct ProxyEngine {
    pool: Arc<BackendPool>,
    algorithms: Arc<AlgorithmRegistry>,
    dispatcher: Dispatcher,
}

impl ProxyEngine {
    pub fn new(pool: Arc<BackendPool>, algorithms: Arc<AlgorithmRegistry>, dispatcher: Dispatcher) -> Self {
        Self {
            pool,
            algorithms,
            dispatcher,
        }
    }

    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    pub fn algorithms(&self) -> &Arc<AlgorithmRegistry> {
        &self.algorithms
    }

    /// Every active backend when splitting, otherwise the algorithm's pick.
    pub fn choose_servers(&self, split: bool) -> Result<Vec<String>, BalancerError> {
        let active = self.pool.active_backends();
        if active.is_empty() {
            return Err(BalancerError::NoActiveBackend);
        }
        if split {
            return Ok(active);
        }
        let algorithm = self.algorithms.current();
        let chosen = algorithm.next_server(&active).ok_or(BalancerError::NoActiveBackend)?;
        tracing::trace!(algorithm = algorithm.name(), backend = %chosen, "Backend selected");
        Ok(vec![chosen])
    }

    pub async fn proxy(
        &self,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        can_split: bool,
    ) -> Result<Response, BalancerError> {
        let servers = self.choose_servers(can_split)?;

        if !can_split {
            let backend = &servers[0];
            let answer = self.dispatcher.send(backend, &method, &uri, &headers, body).await?;
            return Ok(response::passthrough(answer));
        }

        let bodies = split_body(&body, servers.len())?;
        metrics::record_split(bodies.len());
        tracing::debug!(branches = bodies.len(), path = %uri.path(), "Splitting request");

        let method = Arc::new(method);
        let uri = Arc::new(uri);
        let headers = Arc::new(headers);

        let mut branches = JoinSet::new();
        for (backend, body) in servers.into_iter().zip(bodies) {
            let dispatcher = self.dispatcher.clone();
            let method = method.clone();
            let uri = uri.clone();
            let headers = headers.clone();
            branches.spawn(async move {
                let result = dispatcher.send(&backend, &method, &uri, &headers, body).await;
                (backend, result)
            });
        }

        let mut answers: Vec<BackendResponse> = Vec::with_capacity(branches.len());
        while let Some(joined) = branches.join_next().await {
            match joined {
                Ok((_, Ok(answer))) => answers.push(answer),
                Ok((backend, Err(e))) => {
                    tracing::warn!(backend = %backend, error = %e, "Split branch failed");
                }
                Err(e) => tracing::error!(error = %e, "Split branch task failed"),
            }
        }

        let merged = merge_responses(answers)?;
        Ok(response::merged(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HeartbeatConfig, ProxySettings};
    use crate::fanout::dispatch::build_client;
    use crate::load_balancer::AlgorithmKind;
    use crate::security::PermissionClient;
    use std::time::Duration;

    fn engine(urls: &[&str]) -> ProxyEngine {
        let urls: Vec<String> = urls.iter().map(|u| u.to_string()).collect();
        let permissions = Arc::new(PermissionClient::new("secret", 1, Duration::from_millis(1)));
        let pool = Arc::new(BackendPool::new(&urls, &HeartbeatConfig::default(), permissions));
        let algorithms = Arc::new(AlgorithmRegistry::new(AlgorithmKind::RoundRobin, None).unwrap());
        ProxyEngine::new(pool, algorithms, Dispatcher::new(build_client(), &ProxySettings::default()))
    }

    #[test]
    fn test_no_active_backend() {
        let engine = engine(&["http://a:1"]);
        assert!(matches!(engine.choose_servers(false), Err(BalancerError::NoActiveBackend)));
        assert!(matches!(engine.choose_servers(true), Err(BalancerError::NoActiveBackend)));
    }

    #[tokio::test]
    async fn test_split_without_active_backends() {
        let engine = engine(&["http://a:1"]);
        let err = engine
            .proxy(
                Method::POST,
                "/email/template/".parse().unwrap(),
                HeaderMap::new(),
                Bytes::from_static(b"{}"),
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BalancerError::NoActiveBackend));
    }
}
