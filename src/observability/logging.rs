//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Configure log level from config, overridable with `RUST_LOG`
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Fields over formatted strings (`backend = %name`)

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter directives for a configured level.
pub fn default_directives(level: &str) -> String {
    format!("pingpong_balancer={level},tower_http=info")
}

/// Install the global tracing subscriber.
pub fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directives(level).into());

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives("debug"), "pingpong_balancer=debug,tower_http=info");
        assert_eq!(default_directives("warn"), "pingpong_balancer=warn,tower_http=info");
    }
}
