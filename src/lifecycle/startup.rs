//! Startup orchestration.
//!
//! # Responsibilities
//! - Hold the server back until at least one backend is live
//! - Let any number of tasks wait for that moment
//!
//! # Design Decisions
//! - The gate opens exactly once for the lifetime of the process
//! - Late waiters see it already open and return immediately
//! - Backed by a watch channel so "already fired" is state, not timing

use tokio::sync::watch;

/// One-shot readiness signal.
#[derive(Debug)]
pub struct ReadinessGate {
    tx: watch::Sender<bool>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Open the gate. Returns `true` only for the call that actually opened it.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    /// Whether the gate has opened.
    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the gate opens.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}
