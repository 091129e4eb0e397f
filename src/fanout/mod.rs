//! Fan-out/fan-in subsystem.
//!
//! # Data Flow
//! ```text
//! engine.rs
//!     → split.rs    (one JSON body per active backend)
//!     → dispatch.rs (concurrent backend requests)
//!     → merge.rs    (one JSON answer)
//! ```
//!
//! # Design Decisions
//! - Branches run as independent tasks and are awaited together
//! - Failed branches are dropped; only a total failure is surfaced

pub mod dispatch;
pub mod engine;
pub mod merge;
pub mod split;

pub use dispatch::{BackendResponse, DispatchError, Dispatcher};
pub use engine::ProxyEngine;
pub use merge::{merge_responses, MergeError, MergedResponse};
pub use split::{split_body, SplitError};
