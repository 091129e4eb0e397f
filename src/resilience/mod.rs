//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Permission handshake / heartbeat dial:
//!     → retries.rs (bounded attempts, fixed interval)
//!     → exhausted: connection gives up and terminates
//!
//! Backend dispatch:
//!     → fanout::dispatch retries 503 answers with its own budget
//! ```
//!
//! # Design Decisions
//! - Retry budgets are small and fixed; no retry storms
//! - A backend that exhausts its retries is logged and left dead, never fatal

pub mod retries;

pub use retries::{FixedRetry, RetryExhausted};
