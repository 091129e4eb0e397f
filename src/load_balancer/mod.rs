//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request arrives (non-split)
//!     → health::pool (active backend URLs, configuration order)
//!     → registry.rs (current algorithm, swapped atomically at runtime)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through candidates)
//!         - weighted.rs (counter modulo total weight, bucket scan)
//!         - random.rs (uniform pick)
//!     → Return one backend URL
//! ```
//!
//! # Design Decisions
//! - Algorithms only see candidate URLs; liveness is decided by the pool
//! - One instance per algorithm, shared by every request task
//! - Algorithm names validated against a closed enum, never per call

pub mod random;
pub mod registry;
pub mod round_robin;
pub mod weighted;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub use random::RandomSelect;
pub use registry::{AlgorithmKind, AlgorithmRegistry, ConfigurationError};
pub use round_robin::RoundRobin;
pub use weighted::Weighted;

/// A backend selection strategy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick one URL out of `candidates`. `None` only when there is nothing to pick.
    fn next_server(&self, candidates: &[String]) -> Option<String>;

    /// Registry name of the algorithm.
    fn name(&self) -> &'static str;
}

/// Counter value above which the selection counter starts over.
pub const COUNTER_RESET_THRESHOLD: u64 = 1_000_000_000_000_000;

/// Monotonic selection counter shared by all callers of an algorithm.
///
/// The increment is lock-free; the reset takes a separate lock and is
/// advisory, so a few callers may still observe values past the threshold.
#[derive(Debug, Default)]
pub struct SelectionCounter {
    value: AtomicU64,
    reset_lock: Mutex<()>,
}

impl SelectionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn starting_at(value: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
            reset_lock: Mutex::new(()),
        }
    }

    /// Increment and return the new value.
    pub fn next(&self) -> u64 {
        let value = self.value.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        if value > COUNTER_RESET_THRESHOLD {
            self.reset();
        }
        value
    }

    /// Current value without incrementing.
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        if let Ok(_guard) = self.reset_lock.lock() {
            if self.value.load(Ordering::Relaxed) > COUNTER_RESET_THRESHOLD {
                self.value.store(0, Ordering::Relaxed);
            }
        }
    }
}
