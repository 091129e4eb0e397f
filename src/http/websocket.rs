//! WebSocket tunnel relay.
//!
//! # Responsibilities
//! - Pick one active backend for an upgrade request on `/ws/{*path}`
//! - Dial the backend at the same path before accepting the upgrade
//! - Bidirectional frame forwarding until either side ends
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Balancer ←──── WebSocket frames ────→ Backend
//!          text / JSON (X-Protocol-WS)            always text
//! ```
//!
//! # Design Decisions
//! - The backend dial happens before the upgrade, so failures are plain HTTP errors
//! - Client frames always reach the backend as text
//! - Backend frames are re-encoded as JSON unless the protocol is `text`
//! - Ping/pong handled transparently by both WebSocket stacks

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as BackendMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::BalancerError;
use crate::http::request::strip_hop_by_hop;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Query parameter selecting how backend frames are relayed.
pub const PROTOCOL_QUERY_PARAM: &str = "X-Protocol-WS";
pub const DEFAULT_PROTOCOL: &str = "json";
pub const TEXT_PROTOCOL: &str = "text";

type BackendSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// `ws://host:port/<path>` for a backend base URL.
pub fn tunnel_url(backend: &str, path: &str) -> Result<String, BalancerError> {
    let invalid = || BalancerError::InvalidBackendUrl(backend.to_string());
    let base = Url::parse(backend).map_err(|_| invalid())?;
    let host = base.host_str().ok_or_else(invalid)?;
    let port = base.port_or_known_default().ok_or_else(invalid)?;
    Ok(format!("ws://{}:{}/{}", host, port, path.trim_start_matches('/')))
}

/// End-to-end headers worth passing on to the backend dial.
fn tunnel_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);
    for name in [
        header::HOST,
        header::SEC_WEBSOCKET_KEY,
        header::SEC_WEBSOCKET_VERSION,
        header::SEC_WEBSOCKET_EXTENSIONS,
        header::SEC_WEBSOCKET_PROTOCOL,
        header::SEC_WEBSOCKET_ACCEPT,
        header::CONTENT_LENGTH,
    ] {
        headers.remove(name);
    }
    headers
}

async fn dial_backend(url: &str, inbound: &HeaderMap) -> Result<BackendSocket, BalancerError> {
    let mut request = url.into_client_request().map_err(BalancerError::Tunnel)?;
    for (name, value) in tunnel_headers(inbound).iter() {
        request.headers_mut().append(name.clone(), value.clone());
    }
    let (socket, _) = connect_async(request).await.map_err(BalancerError::Tunnel)?;
    Ok(socket)
}

pub async fn tunnel_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    let protocol = params
        .get(PROTOCOL_QUERY_PARAM)
        .cloned()
        .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string());

    let backend = match state.engine.choose_servers(false) {
        Ok(mut servers) => servers.remove(0),
        Err(e) => return e.into_response(),
    };

    let url = match tunnel_url(&backend, &path) {
        Ok(url) => url,
        Err(e) => return e.into_response(),
    };

    let internal = match dial_backend(&url, &headers).await {
        Ok(socket) => socket,
        Err(e) => return e.into_response(),
    };

    tracing::info!(backend = %backend, url = %url, protocol = %protocol, "Tunnel opened");
    upgrade.on_upgrade(move |external| relay(external, internal, protocol))
}

/// Run both copy loops until one ends, then close the backend side.
pub async fn relay(external: WebSocket, internal: BackendSocket, protocol: String) {
    metrics::record_tunnel(1.0);
    let (mut client_tx, mut client_rx) = external.split();
    let (mut backend_tx, mut backend_rx) = internal.split();

    let upstream = async {
        while let Some(frame) = client_rx.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text.as_str().to_string(),
                Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(error = %e, "Error reading from client socket");
                    break;
                }
            };
            if let Err(e) = backend_tx.send(BackendMessage::Text(text.into())).await {
                tracing::debug!(error = %e, "Error writing to backend socket");
                break;
            }
        }
    };

    let downstream = async {
        while let Some(frame) = backend_rx.next().await {
            let payload = match frame {
                Ok(BackendMessage::Text(text)) => text.as_str().as_bytes().to_vec(),
                Ok(BackendMessage::Binary(bytes)) => bytes.to_vec(),
                Ok(BackendMessage::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(error = %e, "Error reading from backend socket");
                    break;
                }
            };

            let outgoing = match relay_payload(&payload, &protocol) {
                Some(text) => text,
                None => {
                    tracing::warn!("Backend frame is not a JSON object, closing tunnel");
                    break;
                }
            };
            if let Err(e) = client_tx.send(Message::Text(outgoing.into())).await {
                tracing::debug!(error = %e, "Error writing to client socket");
                break;
            }
        }
    };

    tokio::select! {
        _ = upstream => {}
        _ = downstream => {}
    }

    if let Err(e) = backend_tx.close().await {
        tracing::debug!(error = %e, "Backend socket already closed");
    }
    let _ = client_tx.close().await;
    metrics::record_tunnel(-1.0);
    tracing::info!("Tunnel closed");
}

/// Text to send to the client for one backend frame, `None` if it must end the relay.
pub fn relay_payload(payload: &[u8], protocol: &str) -> Option<String> {
    if protocol == TEXT_PROTOCOL {
        return Some(String::from_utf8_lossy(payload).into_owned());
    }
    let object: Map<String, Value> = serde_json::from_slice(payload).ok()?;
    serde_json::to_string(&object).ok()
}
