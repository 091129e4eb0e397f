//! Weighted load balancing strategy.
//!
//! Each backend URL carries its configured weight. Only the weights of the
//! current candidates take part: the counter modulo their total lands in one
//! bucket, and the scan walks the buckets subtracting until the remainder fits.
//! A backend that goes down therefore never lends its share to a neighbour.

use crate::load_balancer::{LoadBalancer, RandomSelect, SelectionCounter};

#[derive(Debug)]
pub struct Weighted {
    weights: Vec<(String, u64)>,
    counter: SelectionCounter,
    fallback: RandomSelect,
}

impl Weighted {
    /// Build from `(url, weight)` pairs in configuration order. A repeated URL keeps its first weight.
    pub fn new(weights: Vec<(String, u64)>) -> Self {
        let mut unique: Vec<(String, u64)> = Vec::with_capacity(weights.len());
        for (url, weight) in weights {
            if !unique.iter().any(|(known, _)| *known == url) {
                unique.push((url, weight));
            }
        }
        Self {
            weights: unique,
            counter: SelectionCounter::new(),
            fallback: RandomSelect::new(),
        }
    }

    /// Sum of every configured weight.
    pub fn total_weight(&self) -> u64 {
        self.weights.iter().map(|(_, weight)| weight).sum()
    }

    fn weight_of(&self, url: &str) -> u64 {
        self.weights
            .iter()
            .find(|(known, _)| known == url)
            .map_or(0, |(_, weight)| *weight)
    }
}

impl LoadBalancer for Weighted {
    fn next_server(&self, candidates: &[String]) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }

        let active: Vec<(&String, u64)> = candidates.iter().map(|url| (url, self.weight_of(url))).collect();
        let total: u64 = active.iter().map(|(_, weight)| weight).sum();
        if total == 0 {
            tracing::debug!(candidates = candidates.len(), "No weighted candidate, picking at random");
            return self.fallback.next_server(candidates);
        }

        let mut current = self.counter.next() % total;
        for (url, weight) in active {
            if current < weight {
                return Some(url.clone());
            }
            current -= weight;
        }
        self.fallback.next_server(candidates)
    }

    fn name(&self) -> &'static str {
        "weight"
    }
}
