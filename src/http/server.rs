//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the algorithm registry, backend pool and proxy engine
//! - Create the Axum router: tunnel route plus a catch-all proxy handler
//! - Wire up middleware (tracing, timeout, request ID, process time)
//! - Hold traffic back until the first backend is live
//! - Serve the admin API on its own listener when enabled
//! - Graceful shutdown: drain HTTP, then close every heartbeat connection

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderName, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::BalancerConfig;
use crate::error::BalancerError;
use crate::fanout::dispatch::{build_client, Dispatcher};
use crate::fanout::ProxyEngine;
use crate::health::BackendPool;
use crate::http::request::{forwardable_headers, SplitPolicy, X_BALANCER_REQUEST_ID};
use crate::http::response::process_time;
use crate::http::websocket::tunnel_handler;
use crate::load_balancer::{AlgorithmKind, AlgorithmRegistry, ConfigurationError};
use crate::observability::metrics;
use crate::security::PermissionClient;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ProxyEngine>,
    pub split_policy: Arc<SplitPolicy>,
    pub max_body_bytes: usize,
    pub admin_key: Arc<str>,
}

impl AppState {
    pub fn pool(&self) -> &Arc<BackendPool> {
        self.engine.pool()
    }

    pub fn algorithms(&self) -> &Arc<AlgorithmRegistry> {
        self.engine.algorithms()
    }
}

/// HTTP server for the balancer.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: BalancerConfig,
}

impl HttpServer {
    /// Create the server and every subsystem behind it. No connection is opened yet.
    pub fn new(config: BalancerConfig, exchange_token: String) -> Result<Self, ConfigurationError> {
        let initial: AlgorithmKind = config.proxy.algorithm.parse()?;
        let weights = Some(config.backends.weighted_urls()).filter(|w| !w.is_empty());
        let algorithms = Arc::new(AlgorithmRegistry::new(initial, weights)?);

        let permissions = Arc::new(PermissionClient::new(
            exchange_token,
            config.heartbeat.max_retries,
            config.heartbeat.retry_interval(),
        ));
        let pool = Arc::new(BackendPool::new(&config.backends.urls, &config.heartbeat, permissions));

        let dispatcher = Dispatcher::new(build_client(), &config.proxy);
        let engine = Arc::new(ProxyEngine::new(pool, algorithms, dispatcher));

        let state = AppState {
            engine,
            split_policy: Arc::new(SplitPolicy::new(config.proxy.split_routes.clone())),
            max_body_bytes: config.listener.max_body_bytes,
            admin_key: Arc::from(config.admin.api_key.as_str()),
        };

        let router = Self::build_router(&config, state.clone());
        Ok(Self { router, state, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &BalancerConfig, state: AppState) -> Router {
        let request_id = HeaderName::from_static(X_BALANCER_REQUEST_ID);

        Router::new()
            .route("/ws/{*path}", any(tunnel_handler))
            .fallback(proxy_handler)
            .layer(middleware::from_fn_with_state(state.clone(), require_live_connection))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
            .layer(middleware::from_fn(process_time))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run until `shutdown` fires, accepting connections on `listener` once a backend is live.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let admin_router = admin::router(self.state.clone());
            let mut admin_shutdown = shutdown.resubscribe();
            tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
            tokio::spawn(async move {
                let served = axum::serve(admin_listener, admin_router)
                    .with_graceful_shutdown(async move {
                        let _ = admin_shutdown.recv().await;
                    })
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "Admin API failed");
                }
            });
        }

        let pool = self.state.pool().clone();
        pool.start().await;

        tracing::info!(backends = pool.len(), "Waiting for a backend connection");
        tokio::select! {
            _ = pool.await_ready() => {}
            _ = shutdown.recv() => {
                tracing::info!("Shutdown before any backend connected");
                pool.shutdown().await;
                return Ok(());
            }
        }

        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, live = pool.live_count(), "HTTP server starting");

        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Draining HTTP server");
            })
            .await;

        pool.shutdown().await;
        tracing::info!("HTTP server stopped");
        served
    }
}

/// Reject traffic while no heartbeat connection is running.
async fn require_live_connection(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.pool().live_count() == 0 {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "No backend app at the moment, try again later",
        )
            .into_response();
    }
    next.run(request).await
}

/// Catch-all proxy handler.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let can_split = state.split_policy.can_split(&parts.method, &parts.uri);
    let mode = if can_split { "split" } else { "single" };

    tracing::debug!(
        request_id = ?parts.headers.get(X_BALANCER_REQUEST_ID),
        method = %parts.method,
        path = %parts.uri.path(),
        mode,
        "Proxying request"
    );

    let result = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => {
            let headers = forwardable_headers(&parts.headers);
            state
                .engine
                .proxy(parts.method.clone(), parts.uri.clone(), headers, bytes, can_split)
                .await
        }
        Err(e) => Err(BalancerError::Body(e)),
    };

    let response = result.unwrap_or_else(IntoResponse::into_response);
    metrics::record_request(parts.method.as_str(), response.status().as_u16(), mode, start);
    response
}
