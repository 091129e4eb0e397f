//! Backend pool manager.
//!
//! # Responsibilities
//! - Own one heartbeat connection per configured backend
//! - Track how many connections are running
//! - Open the readiness gate on the first running connection
//! - Expose the active set to the engine and the full set to diagnostics
//! - Drain every connection task on shutdown
//!
//! # Data Flow
//! ```text
//! start()
//!     → one task per connection (run_state_machine)
//!     → link_up / link_down callbacks → live count + readiness gate
//!
//! Request path:
//!     → active_backends() (read lock, connected && started)
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::config::HeartbeatConfig;
use crate::health::backend::BackendKey;
use crate::health::connection::{BackendConnection, ConnectionStatus, LinkObserver};
use crate::lifecycle::ReadinessGate;
use crate::observability::metrics;
use crate::security::PermissionClient;

#[derive(Debug, Default)]
struct PoolInner {
    connections: HashMap<BackendKey, Arc<BackendConnection>>,
    live: usize,
}

/// Shared between the pool and every connection task.
#[derive(Debug, Default)]
struct PoolState {
    inner: RwLock<PoolInner>,
    ready: ReadinessGate,
}

impl PoolState {
    fn mark_running(&self) {
        let live = {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            inner.live += 1;
            inner.live
        };
        metrics::record_live_connections(live);
        if self.ready.fire() {
            tracing::info!("First backend connected, balancer is ready");
        }
    }

    fn mark_stopped(&self) {
        let live = {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            inner.live = inner.live.saturating_sub(1);
            inner.live
        };
        metrics::record_live_connections(live);
    }
}

impl LinkObserver for PoolState {
    fn link_up(&self, connection: &BackendConnection) {
        self.mark_running();
        tracing::debug!(backend = %connection.name(), "Link up");
    }

    fn link_down(&self, connection: &BackendConnection) {
        self.mark_stopped();
        tracing::debug!(backend = %connection.name(), state = %connection.state(), "Link down");
    }
}

/// All backend connections and their liveness.
#[derive(Debug)]
pub struct BackendPool {
    state: Arc<PoolState>,
    tasks: Mutex<JoinSet<()>>,
}

impl BackendPool {
    /// One connection per URL; duplicate URLs collapse onto the first.
    pub fn new(urls: &[String], settings: &HeartbeatConfig, permissions: Arc<PermissionClient>) -> Self {
        let mut connections = HashMap::with_capacity(urls.len());
        for (index, url) in urls.iter().enumerate() {
            let key = BackendKey::from_url(url);
            if connections.contains_key(&key) {
                tracing::warn!(url = %url, "Duplicate backend URL ignored");
                continue;
            }
            let conn = BackendConnection::new(index, url.clone(), permissions.clone(), settings.clone());
            connections.insert(key, Arc::new(conn));
        }

        Self {
            state: Arc::new(PoolState {
                inner: RwLock::new(PoolInner { connections, live: 0 }),
                ready: ReadinessGate::new(),
            }),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    fn connections(&self) -> Vec<Arc<BackendConnection>> {
        let inner = self.state.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = inner.connections.values().cloned().collect();
        all.sort_by_key(|c| c.index());
        all
    }

    /// Spawn the state machine of every connection.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        let observer: Arc<dyn LinkObserver> = self.state.clone();
        for conn in self.connections() {
            tracing::info!(backend = %conn.name(), url = %conn.url(), key = %conn.key(), "Starting connection");
            tasks.spawn(conn.run_state_machine(observer.clone()));
        }
    }

    /// URLs of connections that are connected and started, in config order.
    pub fn active_backends(&self) -> Vec<String> {
        let inner = self.state.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut active: Vec<_> = inner
            .connections
            .values()
            .filter(|c| c.is_active())
            .map(|c| (c.index(), c.url().to_string()))
            .collect();
        active.sort_by_key(|(index, _)| *index);
        active.into_iter().map(|(_, url)| url).collect()
    }

    pub fn live_count(&self) -> usize {
        self.state.inner.read().unwrap_or_else(PoisonError::into_inner).live
    }

    pub fn len(&self) -> usize {
        self.state.inner.read().unwrap_or_else(PoisonError::into_inner).connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_ready(&self) -> bool {
        self.state.ready.is_open()
    }

    /// Resolve once any connection has reached the running state.
    pub async fn await_ready(&self) {
        self.state.ready.wait().await
    }

    /// Status of every connection, dead ones included.
    pub fn snapshot(&self) -> Vec<ConnectionStatus> {
        self.connections().iter().map(|c| c.status()).collect()
    }

    /// Close every connection and wait for all connection tasks to finish.
    pub async fn shutdown(&self) {
        let connections = self.connections();
        tracing::info!(count = connections.len(), "Shutting down backend connections");
        for conn in &connections {
            conn.shutdown().await;
        }

        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Connection task failed");
            }
        }
        tracing::info!("All backend connections closed");
    }

    #[cfg(test)]
    fn connection(&self, url: &str) -> Option<Arc<BackendConnection>> {
        let inner = self.state.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.connections.get(&BackendKey::from_url(url)).cloned()
    }
}
