//! Round-robin load balancing strategy.

use crate::load_balancer::{LoadBalancer, SelectionCounter};

/// Round-robin selector.
/// Stores an internal counter to rotate through candidates.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: SelectionCounter,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_server(&self, candidates: &[String]) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }

        let index = (self.counter.next() % candidates.len() as u64) as usize;
        candidates.get(index).cloned()
    }

    fn name(&self) -> &'static str {
        "round"
    }
}
