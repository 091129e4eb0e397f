//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, readiness)
//!     → request.rs (request ID, split decision, header filtering)
//!     → /ws/{*path}: websocket.rs (tunnel relay)
//!     → otherwise:   fanout::engine (single or split dispatch)
//!     → response.rs (passthrough / merged body, process time)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::{SplitPolicy, X_BALANCER_REQUEST_ID};
pub use server::{AppState, HttpServer};
