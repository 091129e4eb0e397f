//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Start backend connections → ReadinessGate opens → Accept traffic
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Disconnect backends → Join connection tasks
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Listeners start last (traffic only when a backend is live)
//! - Ordered shutdown: stop accept, drain, disconnect heartbeats

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::ReadinessGate;
