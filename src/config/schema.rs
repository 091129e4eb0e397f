//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// Listener configuration (bind address, request limits).
    pub listener: ListenerConfig,

    /// Backend instances to balance across.
    pub backends: BackendsConfig,

    /// Exchange secret used for the permission handshake.
    pub security: SecurityConfig,

    /// Heartbeat connection settings.
    pub heartbeat: HeartbeatConfig,

    /// Proxying, splitting and algorithm selection.
    pub proxy: ProxySettings,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:88").
    pub bind_address: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Maximum inbound body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:88".to_string(),
            request_timeout_secs: 120,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Backend server definitions.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Explicit backend URLs (e.g., "http://127.0.0.1:8080").
    pub urls: Vec<String>,

    /// Optional deploy topology file; its app count expands into more URLs.
    pub deploy_file: Option<PathBuf>,

    /// Host name prefix for URLs generated from the deploy file.
    pub app_host_prefix: String,

    /// Port the generated backends listen on.
    pub app_port: u16,

    /// Weights for weighted selection, parallel to the backend list.
    pub weights: Vec<u64>,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            deploy_file: None,
            app_host_prefix: "notifyr-app".to_string(),
            app_port: 8080,
            weights: Vec::new(),
        }
    }
}

impl BackendsConfig {
    /// Pair each weight with the URL it was configured for.
    pub fn weighted_urls(&self) -> Vec<(String, u64)> {
        self.urls.iter().cloned().zip(self.weights.iter().copied()).collect()
    }
}

/// Permission handshake secrets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// File holding the shared exchange secret.
    pub exchange_token_file: PathBuf,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            exchange_token_file: PathBuf::from("/run/secrets/balancer-exchange-token.txt"),
        }
    }
}

/// Heartbeat connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Interval between PING frames in milliseconds.
    pub ping_interval_ms: u64,

    /// Wait between handshake/dial attempts in milliseconds.
    pub retry_interval_ms: u64,

    /// Maximum handshake/dial attempts before giving up on a backend.
    pub max_retries: u32,
}

impl HeartbeatConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: 60_000,
            retry_interval_ms: 20_000,
            max_retries: 10,
        }
    }
}

/// Proxy behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Initial load balancing algorithm ("random", "round", "weight").
    pub algorithm: String,

    /// Path prefixes that may be split across backends.
    pub split_routes: Vec<String>,

    /// Attempts per backend dispatch while the backend answers 503.
    pub max_attempts: u32,

    /// Delay between 503 retries in milliseconds.
    pub retry_delay_ms: u64,

    /// Client-side timeout for one backend request, 0 disables it.
    pub backend_timeout_secs: u64,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            algorithm: "random".to_string(),
            split_routes: vec![
                "/email/template/".to_string(),
                "/email/custom/".to_string(),
                "/twilio/sms/ongoing/template".to_string(),
                "/twilio/sms/ongoing/custom/".to_string(),
                "/twilio/sms/ongoing/twiml/".to_string(),
                "/twilio/call/ongoing/custom/".to_string(),
            ],
            max_attempts: 5,
            retry_delay_ms: 100,
            backend_timeout_secs: 0,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml() {
        let config: BalancerConfig = toml::from_str(
            r#"
            [backends]
            urls = ["http://127.0.0.1:8080"]
            "#,
        )
        .unwrap();

        assert_eq!(config.backends.urls.len(), 1);
        assert_eq!(config.listener.bind_address, "127.0.0.1:88");
        assert_eq!(config.heartbeat.max_retries, 10);
        assert_eq!(config.heartbeat.retry_interval(), Duration::from_secs(20));
        assert_eq!(config.proxy.max_attempts, 5);
        assert!(!config.admin.enabled);
    }

    #[test]
    fn test_weights_pair_with_urls() {
        let config: BalancerConfig = toml::from_str(
            r#"
            [backends]
            urls = ["http://a:1", "http://b:1"]
            weights = [3, 1]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.backends.weighted_urls(),
            vec![("http://a:1".to_string(), 3), ("http://b:1".to_string(), 1)]
        );
    }
}
