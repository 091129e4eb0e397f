//! Algorithm registry and runtime switching.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::load_balancer::{LoadBalancer, RandomSelect, RoundRobin, Weighted};

/// Errors raised when selecting an algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("algorithm '{0}' is not supported")]
    UnknownAlgorithm(String),

    #[error("algorithm '{0}' is not initialized")]
    Uninitialized(AlgorithmKind),
}

/// The closed set of supported algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmKind {
    Random,
    RoundRobin,
    Weighted,
}

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 3] = [
        AlgorithmKind::Random,
        AlgorithmKind::RoundRobin,
        AlgorithmKind::Weighted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::Random => "random",
            AlgorithmKind::RoundRobin => "round",
            AlgorithmKind::Weighted => "weight",
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(AlgorithmKind::Random),
            "round" | "round_robin" | "round-robin" => Ok(AlgorithmKind::RoundRobin),
            "weight" | "weighted" => Ok(AlgorithmKind::Weighted),
            _ => Err(ConfigurationError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Holds one instance per initialized algorithm and the name of the active one.
#[derive(Debug)]
pub struct AlgorithmRegistry {
    algorithms: HashMap<AlgorithmKind, Arc<dyn LoadBalancer>>,
    current: ArcSwap<AlgorithmKind>,
}

impl AlgorithmRegistry {
    /// Build the registry. The weighted algorithm only exists when `(url, weight)` pairs are given.
    pub fn new(initial: AlgorithmKind, weights: Option<Vec<(String, u64)>>) -> Result<Self, ConfigurationError> {
        let mut algorithms: HashMap<AlgorithmKind, Arc<dyn LoadBalancer>> = HashMap::new();
        algorithms.insert(AlgorithmKind::Random, Arc::new(RandomSelect::new()));
        algorithms.insert(AlgorithmKind::RoundRobin, Arc::new(RoundRobin::new()));
        if let Some(weights) = weights.filter(|w| !w.is_empty()) {
            algorithms.insert(AlgorithmKind::Weighted, Arc::new(Weighted::new(weights)));
        }

        if !algorithms.contains_key(&initial) {
            return Err(ConfigurationError::Uninitialized(initial));
        }

        Ok(Self {
            algorithms,
            current: ArcSwap::from_pointee(initial),
        })
    }

    /// Kind of the active algorithm.
    pub fn current_kind(&self) -> AlgorithmKind {
        **self.current.load()
    }

    /// The active algorithm instance.
    pub fn current(&self) -> Arc<dyn LoadBalancer> {
        let kind = self.current_kind();
        match self.algorithms.get(&kind) {
            Some(algorithm) => algorithm.clone(),
            // unreachable: only initialized kinds are ever stored
            None => Arc::new(RandomSelect::new()),
        }
    }

    /// Switch the active algorithm by name.
    pub fn set_current(&self, name: &str) -> Result<AlgorithmKind, ConfigurationError> {
        let kind: AlgorithmKind = name.parse()?;
        if !self.algorithms.contains_key(&kind) {
            return Err(ConfigurationError::Uninitialized(kind));
        }
        let previous = self.current.swap(Arc::new(kind));
        tracing::info!(from = %previous, to = %kind, "Load balancing algorithm switched");
        Ok(kind)
    }

    /// Names of the algorithms that can be switched to.
    pub fn available(&self) -> Vec<AlgorithmKind> {
        AlgorithmKind::ALL
            .into_iter()
            .filter(|k| self.algorithms.contains_key(k))
            .collect()
    }
}
