//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject an empty backend set
//! - Validate value ranges (intervals > 0, attempts > 0)
//! - Check the algorithm name and weight table
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs after deploy-file expansion, on the final URL list

use std::fmt;
use std::net::SocketAddr;
use url::Url;

use crate::config::schema::BalancerConfig;
use crate::load_balancer::AlgorithmKind;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a fully loaded configuration.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.backends.urls.is_empty() {
        errors.push(ValidationError::new("backends.urls", "no backend configured"));
    }
    for raw in &config.backends.urls {
        match Url::parse(raw) {
            Ok(url) if url.host_str().is_some() && matches!(url.scheme(), "http" | "https") => {}
            _ => errors.push(ValidationError::new(
                "backends.urls",
                format!("'{}' is not an http(s) URL with a host", raw),
            )),
        }
    }

    let weights = &config.backends.weights;
    if !weights.is_empty() && weights.len() != config.backends.urls.len() {
        errors.push(ValidationError::new(
            "backends.weights",
            format!("{} weights for {} backends", weights.len(), config.backends.urls.len()),
        ));
    }

    match config.proxy.algorithm.parse::<AlgorithmKind>() {
        Ok(AlgorithmKind::Weighted) if weights.is_empty() => errors.push(ValidationError::new(
            "proxy.algorithm",
            "weighted selection needs backends.weights",
        )),
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new("proxy.algorithm", e.to_string())),
    }

    if config.proxy.max_attempts == 0 {
        errors.push(ValidationError::new("proxy.max_attempts", "must be at least 1"));
    }
    if config.heartbeat.max_retries == 0 {
        errors.push(ValidationError::new("heartbeat.max_retries", "must be at least 1"));
    }
    if config.heartbeat.ping_interval_ms == 0 {
        errors.push(ValidationError::new("heartbeat.ping_interval_ms", "must be positive"));
    }

    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "admin.bind_address",
            format!("'{}' is not a socket address", config.admin.bind_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
