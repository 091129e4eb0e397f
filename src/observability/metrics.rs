//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_requests_total` (counter): requests by method, status, mode
//! - `balancer_request_duration_seconds` (histogram): end-to-end latency
//! - `balancer_live_connections` (gauge): heartbeat connections in running state
//! - `balancer_connection_transitions_total` (counter): state changes per backend
//! - `balancer_split_branches_total` (counter): backend requests produced by splits
//! - `balancer_tunnels_active` (gauge): open tunnel relays
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one proxied request.
pub fn record_request(method: &str, status: u16, mode: &'static str, start: Instant) {
    counter!(
        "balancer_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "mode" => mode
    )
    .increment(1);
    histogram!("balancer_request_duration_seconds", "mode" => mode)
        .record(start.elapsed().as_secs_f64());
}

/// Current number of running heartbeat connections.
pub fn record_live_connections(count: usize) {
    gauge!("balancer_live_connections").set(count as f64);
}

/// A backend connection entered `state`.
pub fn record_transition(backend: &str, state: &'static str) {
    counter!(
        "balancer_connection_transitions_total",
        "backend" => backend.to_string(),
        "state" => state
    )
    .increment(1);
}

/// A split produced `branches` backend requests.
pub fn record_split(branches: usize) {
    counter!("balancer_split_branches_total").increment(branches as u64);
}

/// A tunnel relay opened (`delta = 1.0`) or closed (`delta = -1.0`).
pub fn record_tunnel(delta: f64) {
    gauge!("balancer_tunnels_active").increment(delta);
}
