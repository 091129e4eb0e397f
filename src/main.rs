//! Ping-pong load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────────┐
//!                        │                      BALANCER                        │
//!   Client Request       │  ┌─────────┐    ┌──────────────┐    ┌────────────┐   │
//!   ─────────────────────┼─▶│  http   │───▶│   fanout     │───▶│  dispatch  │───┼──▶ Backend HTTP
//!                        │  │ server  │    │   engine     │    │ (503 retry)│   │
//!                        │  └────┬────┘    └──────┬───────┘    └────────────┘   │
//!                        │       │ /ws/*          │ active set                   │
//!                        │       ▼                ▼                              │
//!                        │  ┌─────────┐    ┌──────────────┐    ┌────────────┐   │
//!   Client WebSocket ◀───┼──│ tunnel  │    │ backend pool │───▶│ heartbeat  │◀──┼──▶ Backend /pong/
//!                        │  │  relay  │    │ + algorithms │    │ connection │   │
//!                        │  └─────────┘    └──────────────┘    └────────────┘   │
//!                        │                                                      │
//!                        │  config · security · resilience · lifecycle · obs   │
//!                        └──────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `pingpong-balancer [CONFIG]` (default `balancer.toml`).

use std::path::PathBuf;
use tokio::net::TcpListener;

use pingpong_balancer::config::{load_config, load_exchange_token};
use pingpong_balancer::lifecycle::signals::spawn_signal_listener;
use pingpong_balancer::lifecycle::Shutdown;
use pingpong_balancer::observability::{logging, metrics};
use pingpong_balancer::HttpServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("balancer.toml"));

    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", config_path.display(), e);
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "pingpong-balancer starting");
    tracing::info!(
        config = %config_path.display(),
        bind_address = %config.listener.bind_address,
        backends = config.backends.urls.len(),
        algorithm = %config.proxy.algorithm,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let exchange_token = load_exchange_token(&config.security.exchange_token_file)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config, exchange_token)?;

    let shutdown = Shutdown::new();
    spawn_signal_listener(&shutdown);

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
