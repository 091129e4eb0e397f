use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::error::BalancerError;
use crate::health::ConnectionStatus;
use crate::http::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub ready: bool,
    pub live_connections: usize,
    pub backends: usize,
    pub algorithm: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlgorithmInfo {
    pub current: String,
    pub available: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AlgorithmChange {
    pub name: String,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let pool = state.pool();
    let ready = pool.is_ready();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: if pool.live_count() > 0 { "operational" } else { "degraded" }.to_string(),
        ready,
        live_connections: pool.live_count(),
        backends: pool.len(),
        algorithm: state.algorithms().current_kind().to_string(),
    })
}

pub async fn get_backends(State(state): State<AppState>) -> Json<Vec<ConnectionStatus>> {
    Json(state.pool().snapshot())
}

fn algorithm_info(state: &AppState) -> AlgorithmInfo {
    let registry = state.algorithms();
    AlgorithmInfo {
        current: registry.current_kind().to_string(),
        available: registry.available().iter().map(|k| k.to_string()).collect(),
    }
}

pub async fn get_algorithm(State(state): State<AppState>) -> Json<AlgorithmInfo> {
    Json(algorithm_info(&state))
}

pub async fn set_algorithm(
    State(state): State<AppState>,
    Json(change): Json<AlgorithmChange>,
) -> Result<(StatusCode, Json<AlgorithmInfo>), BalancerError> {
    state.algorithms().set_current(&change.name)?;
    Ok((StatusCode::OK, Json(algorithm_info(&state))))
}
