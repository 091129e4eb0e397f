//! Deploy topology file.
//!
//! The deploy file describes how many application instances were started:
//!
//! ```json
//! { "scaling": { "app": 3, "worker": 2, "balancer": 1 }, "version": "1.4.0" }
//! ```
//!
//! Each app instance `i` (1-based) is reachable at `http://<prefix>-<i>:<port>`.

use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Instance counts per role.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scaling {
    pub app: u32,
    pub worker: u32,
    pub balancer: u32,
}

/// Parsed deploy topology.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeployTopology {
    pub scaling: Scaling,
    pub version: Option<String>,
}

impl DeployTopology {
    /// Backend URLs for every app instance.
    pub fn app_urls(&self, host_prefix: &str, port: u16) -> Vec<String> {
        (1..=self.scaling.app)
            .map(|i| format!("http://{}-{}:{}", host_prefix, i, port))
            .collect()
    }
}

/// Error reading the deploy file.
#[derive(Debug)]
pub enum DeployError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for DeployError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeployError::Io(e) => write!(f, "cannot read deploy file: {}", e),
            DeployError::Parse(e) => write!(f, "invalid deploy file: {}", e),
        }
    }
}

impl std::error::Error for DeployError {}

/// Read and parse a deploy topology file.
pub fn load_topology(path: &Path) -> Result<DeployTopology, DeployError> {
    let content = fs::read_to_string(path).map_err(DeployError::Io)?;
    serde_json::from_str(&content).map_err(DeployError::Parse)
}
