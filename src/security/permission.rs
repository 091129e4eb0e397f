//! Permission handshake with a backend.
//!
//! # Responsibilities
//! - Ask a backend for a one-time heartbeat token using the shared secret
//! - Retry transport failures at a fixed interval
//! - Decode the application descriptor the backend returns
//!
//! # Design Decisions
//! - Only transport errors are retried; a non-200 answer is final
//! - The token travels in a response header, never in the body

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::resilience::{FixedRetry, RetryExhausted};

/// Route on every backend that issues heartbeat tokens.
pub const PERMISSION_ROUTE: &str = "ping-pong/permission/_pong_/";
/// Request header carrying the shared exchange secret.
pub const EXCHANGE_TOKEN_HEADER: &str = "X-Balancer-Exchange-Token";
/// Response header carrying the issued token.
pub const PERMISSION_TOKEN_HEADER: &str = "X-Ping-Pong-Token";

/// Errors during the permission handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("permission request failed: {0}")]
    Request(#[from] RetryExhausted<reqwest::Error>),

    #[error("permission request failed with status code: {0}")]
    Status(u16),

    #[error("failed to decode application descriptor: {0}")]
    Descriptor(#[source] reqwest::Error),

    #[error("failed to retrieve the permission token")]
    MissingToken,
}

/// Hardware/process shape reported by a backend.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppSpec {
    #[serde(alias = "CpuCore")]
    pub cpu_core: Option<u64>,
    #[serde(alias = "ProcessCount")]
    pub process_count: Option<u64>,
    #[serde(alias = "Ram")]
    pub ram: Option<u64>,
    #[serde(alias = "Weight")]
    pub weight: Option<f64>,
}

/// Application descriptor returned alongside a permission token.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppDescriptor {
    #[serde(alias = "Id")]
    pub id: Option<String>,
    #[serde(alias = "InstanceId")]
    pub instance_id: Option<String>,
    #[serde(alias = "ParentPid")]
    pub parent_pid: Option<serde_json::Value>,
    #[serde(alias = "Roles")]
    pub roles: Vec<String>,
    #[serde(alias = "Capabilities")]
    pub capabilities: Vec<String>,
    #[serde(alias = "Spec")]
    pub spec: AppSpec,
}

/// A granted permission.
#[derive(Debug, Clone)]
pub struct Permission {
    pub token: String,
    pub app: AppDescriptor,
}

/// Issues permission requests on behalf of every backend connection.
#[derive(Debug, Clone)]
pub struct PermissionClient {
    http: reqwest::Client,
    exchange_token: String,
    retry: FixedRetry,
}

impl PermissionClient {
    pub fn new(exchange_token: impl Into<String>, max_attempts: u32, retry_interval: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            exchange_token: exchange_token.into(),
            retry: FixedRetry::new(max_attempts, retry_interval),
        }
    }

    /// Permission endpoint for a backend base URL.
    pub fn permission_url(base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), PERMISSION_ROUTE)
    }

    /// Request a heartbeat token from `base_url`.
    pub async fn request_permission(&self, name: &str, base_url: &str) -> Result<Permission, HandshakeError> {
        let url = Self::permission_url(base_url);

        let response = self
            .retry
            .run(name, |_| {
                self.http
                    .get(&url)
                    .header(EXCHANGE_TOKEN_HEADER, &self.exchange_token)
                    .send()
            })
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(HandshakeError::Status(status.as_u16()));
        }

        let token = response
            .headers()
            .get(PERMISSION_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let app: AppDescriptor = response.json().await.map_err(HandshakeError::Descriptor)?;
        let token = token.filter(|t| !t.is_empty()).ok_or(HandshakeError::MissingToken)?;

        tracing::debug!(
            backend = %name,
            instance_id = ?app.instance_id,
            roles = ?app.roles,
            "Permission granted"
        );

        Ok(Permission { token, app })
    }
}
