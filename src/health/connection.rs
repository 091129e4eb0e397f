//! Heartbeat connection to one backend.
//!
//! # Responsibilities
//! - Obtain a permission token and dial the backend's heartbeat socket
//! - Send `PING` text frames at a fixed interval while connected
//! - Read the socket until it fails, then classify the disconnect
//! - Drive the ToConnect → ToRun → ToQuit state machine
//!
//! # Design Decisions
//! - Flags live behind a std `RwLock`, never held across an await
//! - The socket sink sits behind an async mutex shared by heartbeat and disconnect
//! - A watch signal wakes both loops when the link is torn down locally

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::config::HeartbeatConfig;
use crate::health::backend::BackendKey;
use crate::health::state::{
    ConnectionState, DisconnectCause, CLOSE_NO_STATUS, UNEXPECTED_PEER_READ_ERROR,
};
use crate::observability::metrics;
use crate::resilience::{FixedRetry, RetryExhausted};
use crate::security::{AppDescriptor, HandshakeError, PermissionClient};

/// Heartbeat socket route on every backend.
pub const PONG_WS_ROUTE: &str = "pong/";
/// Header carrying the permission token on the heartbeat dial.
pub const WS_AUTH_HEADER: &str = "x-ws-auth-key";
/// Heartbeat frame payload.
pub const PING_PAYLOAD: &str = "PING";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Dial, read and write failures on the heartbeat socket.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid backend URL '{0}'")]
    InvalidUrl(String),

    #[error("permission token is not a valid header value")]
    InvalidToken,

    #[error("failed to connect heartbeat socket: {0}")]
    Dial(RetryExhausted<tungstenite::Error>),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

/// Why a ToConnect attempt ended without a link.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("connection is shutting down")]
    Stopped,
}

/// Receives link up/down notifications from connections.
pub trait LinkObserver: Send + Sync {
    /// The connection just entered the running state.
    fn link_up(&self, connection: &BackendConnection);
    /// The connection just left the running state.
    fn link_down(&self, connection: &BackendConnection);
}

#[derive(Debug, Clone)]
struct LinkState {
    connected: bool,
    started: bool,
    state: ConnectionState,
    permission: Option<String>,
    app: Option<AppDescriptor>,
}

/// Point-in-time view of a connection, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub name: String,
    pub url: String,
    pub key: String,
    pub state: &'static str,
    pub connected: bool,
    pub started: bool,
    pub app: Option<AppDescriptor>,
}

/// One heartbeat connection, owned by the pool.
pub struct BackendConnection {
    name: String,
    url: String,
    index: usize,
    key: BackendKey,
    link: RwLock<LinkState>,
    sink: Mutex<Option<WsSink>>,
    link_closed: watch::Sender<bool>,
    stop: watch::Sender<bool>,
    permissions: Arc<PermissionClient>,
    settings: HeartbeatConfig,
}

impl std::fmt::Debug for BackendConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConnection")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl BackendConnection {
    pub fn new(
        index: usize,
        url: impl Into<String>,
        permissions: Arc<PermissionClient>,
        settings: HeartbeatConfig,
    ) -> Self {
        let url = url.into();
        let (link_closed, _) = watch::channel(true);
        let (stop, _) = watch::channel(false);
        Self {
            name: format!("Instance {}", index),
            key: BackendKey::from_url(&url),
            url,
            index,
            link: RwLock::new(LinkState {
                connected: false,
                started: false,
                state: ConnectionState::ToConnect,
                permission: None,
                app: None,
            }),
            sink: Mutex::new(None),
            link_closed,
            stop,
            permissions,
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Position of the backend in the configuration.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn key(&self) -> BackendKey {
        self.key
    }

    fn read_link(&self) -> RwLockReadGuard<'_, LinkState> {
        self.link.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_link(&self) -> RwLockWriteGuard<'_, LinkState> {
        self.link.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        self.read_link().state
    }

    fn set_state(&self, state: ConnectionState) {
        self.write_link().state = state;
    }

    pub fn is_connected(&self) -> bool {
        self.read_link().connected
    }

    /// Connected with a permission obtained at least once.
    pub fn is_active(&self) -> bool {
        let link = self.read_link();
        link.connected && link.started
    }

    /// Whether shutdown was requested.
    pub fn is_stopping(&self) -> bool {
        *self.stop.borrow()
    }

    pub fn status(&self) -> ConnectionStatus {
        let link = self.read_link();
        ConnectionStatus {
            name: self.name.clone(),
            url: self.url.clone(),
            key: self.key.to_string(),
            state: link.state.as_str(),
            connected: link.connected,
            started: link.started,
            app: link.app.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn force_link(&self, connected: bool, started: bool) {
        let mut link = self.write_link();
        link.connected = connected;
        link.started = started;
    }

    /// `ws://host:port/pong/` for this backend.
    pub fn heartbeat_url(&self) -> Result<String, TransportError> {
        let url = Url::parse(&self.url).map_err(|_| TransportError::InvalidUrl(self.url.clone()))?;
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidUrl(self.url.clone()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| TransportError::InvalidUrl(self.url.clone()))?;
        Ok(format!("ws://{}:{}/{}", host, port, PONG_WS_ROUTE))
    }

    /// Permission handshake followed by the heartbeat dial.
    async fn connect(&self) -> Result<WsSource, ConnectError> {
        let permission = self.permissions.request_permission(&self.name, &self.url).await?;
        {
            let mut link = self.write_link();
            link.permission = Some(permission.token.clone());
            link.app = Some(permission.app);
            link.started = true;
        }

        let stream = self.dial(&permission.token).await?;
        let (sink, source) = stream.split();
        *self.sink.lock().await = Some(sink);

        self.write_link().connected = true;
        self.link_closed.send_replace(false);

        tracing::info!(backend = %self.name, url = %self.url, "Connected");
        Ok(source)
    }

    async fn dial(&self, token: &str) -> Result<WsStream, TransportError> {
        let url = self.heartbeat_url()?;
        let auth = HeaderValue::from_str(token).map_err(|_| TransportError::InvalidToken)?;
        let retry = FixedRetry::new(self.settings.max_retries, self.settings.retry_interval());

        let (stream, _response) = retry
            .run(&self.name, |_| {
                let url = url.clone();
                let auth = auth.clone();
                async move {
                    let mut request = url.into_client_request()?;
                    request
                        .headers_mut()
                        .insert(HeaderName::from_static(WS_AUTH_HEADER), auth);
                    connect_async(request).await
                }
            })
            .await
            .map_err(TransportError::Dial)?;

        Ok(stream)
    }

    /// Tear the link down. No-op (returns `false`) when already disconnected.
    pub async fn disconnect(&self, cause: DisconnectCause) -> bool {
        let next = {
            let mut link = self.write_link();
            if !link.connected {
                return false;
            }
            link.connected = false;
            link.state = cause.next_state();
            link.state
        };
        self.link_closed.send_replace(true);

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if cause == DisconnectCause::SelfInitiated {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "balancer shutdown".into(),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
            }
            if let Err(e) = sink.close().await {
                tracing::debug!(backend = %self.name, error = %e, "Socket already closed");
            }
        }

        tracing::info!(
            backend = %self.name,
            url = %self.url,
            cause = ?cause,
            next_state = %next,
            "Disconnected"
        );
        true
    }

    /// Stop for good: abort any connect attempt and close the link.
    pub async fn shutdown(&self) {
        self.stop.send_replace(true);
        if !self.disconnect(DisconnectCause::SelfInitiated).await {
            self.set_state(ConnectionState::ToQuit);
        }
    }

    /// Drive the state machine until ToQuit.
    pub async fn run_state_machine(self: Arc<Self>, observer: Arc<dyn LinkObserver>) {
        let mut pending: Option<WsSource> = None;

        loop {
            let state = self.state();
            metrics::record_transition(&self.name, state.as_str());

            match state {
                ConnectionState::ToConnect => {
                    let mut stop = self.stop.subscribe();
                    let outcome = tokio::select! {
                        result = self.connect() => result,
                        _ = signalled(&mut stop) => Err(ConnectError::Stopped),
                    };

                    match outcome {
                        Ok(source) if self.is_stopping() => {
                            drop(source);
                            self.disconnect(DisconnectCause::SelfInitiated).await;
                            self.set_state(ConnectionState::ToQuit);
                        }
                        Ok(source) => {
                            pending = Some(source);
                            self.set_state(ConnectionState::ToRun);
                            observer.link_up(&self);
                        }
                        Err(ConnectError::Stopped) => {
                            tracing::info!(backend = %self.name, "Connect attempt abandoned for shutdown");
                            self.set_state(ConnectionState::ToQuit);
                        }
                        Err(e) => {
                            tracing::error!(
                                backend = %self.name,
                                url = %self.url,
                                error = %e,
                                "Error connecting backend"
                            );
                            self.set_state(ConnectionState::ToQuit);
                        }
                    }
                }

                ConnectionState::ToRun => match pending.take() {
                    Some(source) => {
                        self.run_link(source).await;
                        observer.link_down(&self);
                    }
                    None => self.set_state(ConnectionState::ToConnect),
                },

                ConnectionState::ToQuit => {
                    tracing::info!(backend = %self.name, "Heartbeat connection terminated");
                    return;
                }

                ConnectionState::ToIdle => {
                    tokio::time::sleep(self.settings.retry_interval()).await;
                }
            }
        }
    }

    /// Run heartbeat sender and receiver until both end.
    async fn run_link(self: &Arc<Self>, source: WsSource) {
        let heartbeat = tokio::spawn(self.clone().heartbeat());
        let receiver = tokio::spawn(self.clone().receive(source));

        let (heartbeat, receiver) = tokio::join!(heartbeat, receiver);
        if let Err(e) = heartbeat {
            tracing::error!(backend = %self.name, error = %e, "Heartbeat task failed");
        }
        if let Err(e) = receiver {
            tracing::error!(backend = %self.name, error = %e, "Receiver task failed");
        }

        // a panicked loop must not leave the link half open
        self.disconnect(DisconnectCause::Peer(UNEXPECTED_PEER_READ_ERROR)).await;
    }

    async fn heartbeat(self: Arc<Self>) {
        let period = self.settings.ping_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        let mut closed = self.link_closed.subscribe();

        loop {
            tokio::select! {
                _ = signalled(&mut closed) => return,
                _ = ticker.tick() => {}
            }

            if !self.is_connected() {
                return;
            }

            let sent = {
                let mut sink = self.sink.lock().await;
                match sink.as_mut() {
                    Some(sink) => sink.send(Message::Text(PING_PAYLOAD.into())).await,
                    None => return,
                }
            };

            if let Err(e) = sent {
                tracing::warn!(backend = %self.name, error = %e, "Ping error");
                return;
            }
            tracing::trace!(backend = %self.name, "Ping sent");
        }
    }

    async fn receive(self: Arc<Self>, mut source: WsSource) {
        let mut closed = self.link_closed.subscribe();

        loop {
            let next = tokio::select! {
                _ = signalled(&mut closed) => return,
                next = source.next() => next,
            };

            match next {
                Some(Ok(Message::Close(frame))) => {
                    let code = frame
                        .as_ref()
                        .map(|f| u16::from(f.code))
                        .unwrap_or(CLOSE_NO_STATUS);
                    tracing::info!(
                        backend = %self.name,
                        code,
                        reason = %frame.as_ref().map(|f| f.reason.as_str()).unwrap_or(""),
                        "Backend closed heartbeat connection"
                    );
                    self.disconnect(DisconnectCause::Peer(code)).await;
                    return;
                }
                Some(Ok(message)) => {
                    tracing::trace!(backend = %self.name, len = message.len(), "Heartbeat frame received");
                }
                Some(Err(e)) => {
                    tracing::warn!(backend = %self.name, error = %e, "Read error");
                    self.disconnect(DisconnectCause::Peer(UNEXPECTED_PEER_READ_ERROR)).await;
                    return;
                }
                None => {
                    tracing::warn!(backend = %self.name, "Heartbeat stream ended without close frame");
                    self.disconnect(DisconnectCause::Peer(UNEXPECTED_PEER_READ_ERROR)).await;
                    return;
                }
            }
        }
    }
}

/// Resolve once the watched flag is set (or its sender is gone).
async fn signalled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|set| *set).await.map(|_| ());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn connection(url: &str) -> BackendConnection {
        let permissions = Arc::new(PermissionClient::new("secret", 1, Duration::from_millis(1)));
        BackendConnection::new(0, url, permissions, HeartbeatConfig::default())
    }

    #[test]
    fn test_heartbeat_url() {
        assert_eq!(
            connection("http://127.0.0.1:8080").heartbeat_url().unwrap(),
            "ws://127.0.0.1:8080/pong/"
        );
        assert_eq!(connection("http://app").heartbeat_url().unwrap(), "ws://app:80/pong/");
        assert!(connection("not a url").heartbeat_url().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_classification() {
        let cases = [
            (1000, ConnectionState::ToQuit),
            (1012, ConnectionState::ToConnect),
            (9999, ConnectionState::ToQuit),
        ];
        for (code, expected) in cases {
            let conn = connection("http://127.0.0.1:8080");
            conn.force_link(true, true);
            assert!(conn.disconnect(DisconnectCause::Peer(code)).await);
            assert_eq!(conn.state(), expected, "close code {}", code);
            assert!(!conn.is_connected());
        }
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let conn = connection("http://127.0.0.1:8080");
        conn.force_link(true, true);

        assert!(conn.disconnect(DisconnectCause::Peer(1012)).await);
        assert_eq!(conn.state(), ConnectionState::ToConnect);

        // second call sees the link already down and changes nothing
        assert!(!conn.disconnect(DisconnectCause::Peer(1000)).await);
        assert_eq!(conn.state(), ConnectionState::ToConnect);
    }

    #[tokio::test]
    async fn test_self_initiated_forces_quit() {
        let conn = connection("http://127.0.0.1:8080");
        conn.force_link(true, true);
        conn.shutdown().await;
        assert_eq!(conn.state(), ConnectionState::ToQuit);
        assert!(conn.is_stopping());

        let idle = connection("http://127.0.0.1:8081");
        idle.shutdown().await;
        assert_eq!(idle.state(), ConnectionState::ToQuit);
    }

    #[test]
    fn test_active_requires_both_flags() {
        let conn = connection("http://127.0.0.1:8080");
        assert!(!conn.is_active());
        conn.force_link(true, false);
        assert!(!conn.is_active());
        conn.force_link(true, true);
        assert!(conn.is_active());
        assert_eq!(conn.status().name, "Instance 0");
    }
}
