//! Shared utilities for integration tests: mock backends and a balancer harness.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::ws::{CloseFrame, Message, WebSocketUpgrade},
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use pingpong_balancer::config::{BalancerConfig, HeartbeatConfig};
use pingpong_balancer::lifecycle::Shutdown;
use pingpong_balancer::HttpServer;

pub const SECRET: &str = "test-exchange-secret";

#[derive(Clone)]
struct MockState {
    name: String,
    secret: String,
    token: String,
    pings: Arc<AtomicUsize>,
    hits: Arc<AtomicUsize>,
    permissions: Arc<AtomicUsize>,
    status: Arc<AtomicU16>,
    control: broadcast::Sender<u16>,
}

/// An in-process backend speaking the permission, heartbeat and echo protocols.
pub struct MockBackend {
    pub addr: SocketAddr,
    pub name: String,
    state: MockState,
}

impl MockBackend {
    pub async fn start(name: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (control, _) = broadcast::channel(4);

        let state = MockState {
            name: name.to_string(),
            secret: SECRET.to_string(),
            token: format!("token-{}", addr.port()),
            pings: Arc::new(AtomicUsize::new(0)),
            hits: Arc::new(AtomicUsize::new(0)),
            permissions: Arc::new(AtomicUsize::new(0)),
            status: Arc::new(AtomicU16::new(200)),
            control,
        };

        let app = Router::new()
            .route("/ping-pong/permission/_pong_/", get(permission))
            .route("/pong/", get(pong))
            .route("/echo", get(echo_socket))
            .fallback(echo)
            .with_state(state.clone());

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            name: name.to_string(),
            state,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn pings(&self) -> usize {
        self.state.pings.load(Ordering::SeqCst)
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn permission_requests(&self) -> usize {
        self.state.permissions.load(Ordering::SeqCst)
    }

    /// Answer every proxied request with `status`.
    pub fn respond_with(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    /// Close every open heartbeat socket with `code`.
    pub fn close_heartbeats(&self, code: u16) {
        let _ = self.state.control.send(code);
    }
}

async fn permission(State(state): State<MockState>, headers: HeaderMap) -> Response {
    state.permissions.fetch_add(1, Ordering::SeqCst);
    let secret = headers
        .get("x-balancer-exchange-token")
        .and_then(|v| v.to_str().ok());
    if secret != Some(state.secret.as_str()) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let mut response = Json(json!({
        "id": state.name,
        "instance_id": state.name,
        "parent_pid": 1,
        "roles": ["ADMIN"],
        "capabilities": ["email"],
        "spec": {"cpu_core": 2, "weight": 1.0}
    }))
    .into_response();
    response
        .headers_mut()
        .insert("x-ping-pong-token", HeaderValue::from_str(&state.token).unwrap());
    response
}

async fn pong(State(state): State<MockState>, headers: HeaderMap, upgrade: WebSocketUpgrade) -> Response {
    let token = headers.get("x-ws-auth-key").and_then(|v| v.to_str().ok());
    if token != Some(state.token.as_str()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let mut control = state.control.subscribe();
    upgrade.on_upgrade(move |mut socket| async move {
        loop {
            tokio::select! {
                frame = socket.recv() => match frame {
                    Some(Ok(Message::Text(text))) if text.as_str() == "PING" => {
                        state.pings.fetch_add(1, Ordering::SeqCst);
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                },
                code = control.recv() => {
                    if let Ok(code) = code {
                        let frame = CloseFrame { code, reason: "test".into() };
                        let _ = socket.send(Message::Close(Some(frame))).await;
                    }
                    break;
                }
            }
        }
    })
}

async fn echo_socket(upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(|mut socket| async move {
        while let Some(Ok(frame)) = socket.recv().await {
            if let Message::Text(text) = frame {
                let reply = json!({"echo": text.as_str()}).to_string();
                if socket.send(Message::Text(reply.into())).await.is_err() {
                    break;
                }
            }
        }
    })
}

/// Echo handler: `content` items come back as `results`.
async fn echo(State(state): State<MockState>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let status = StatusCode::from_u16(state.status.load(Ordering::SeqCst)).unwrap();
    if status != StatusCode::OK {
        return (status, "unavailable").into_response();
    }

    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let results = match payload.get("content") {
        Some(Value::Array(items)) => items.clone(),
        _ => vec![json!({"method": method.as_str(), "path": uri.path(), "backend": state.name})],
    };
    let request_id = uuid::Uuid::new_v4().to_string();
    let forwarded_id = headers
        .get("x-balancer-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let mut response = Json(json!({
        "results": results,
        "errors": {},
        "meta": {"x_request_id": request_id, "service": "echo", "balancer_request_id": forwarded_id}
    }))
    .into_response();
    let out = response.headers_mut();
    out.insert("x-instance-id", HeaderValue::from_str(&state.name).unwrap());
    out.insert("x-request-id", HeaderValue::from_str(&request_id).unwrap());
    out.insert("x-process-time", HeaderValue::from_static("1"));
    response
}

/// Fast heartbeat settings for tests.
pub fn heartbeat_settings() -> HeartbeatConfig {
    HeartbeatConfig {
        ping_interval_ms: 50,
        retry_interval_ms: 50,
        max_retries: 3,
    }
}

pub fn balancer_config(urls: Vec<String>) -> BalancerConfig {
    let mut config = BalancerConfig::default();
    config.backends.urls = urls;
    config.heartbeat = heartbeat_settings();
    config.proxy.retry_delay_ms = 10;
    config
}

/// A running balancer.
pub struct BalancerHandle {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<std::io::Result<()>>,
}

impl BalancerHandle {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

pub async fn start_balancer(config: BalancerConfig) -> BalancerHandle {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, SECRET.to_string()).unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let task = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    BalancerHandle { addr, shutdown, task }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Poll `condition` until it holds or `limit` elapses.
pub async fn wait_until<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Await `future` or panic after `limit`.
pub async fn within<T>(limit: Duration, future: impl Future<Output = T>) -> T {
    tokio::time::timeout(limit, future).await.expect("timed out")
}
