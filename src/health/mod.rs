//! Backend liveness subsystem.
//!
//! # Data Flow
//! ```text
//! pool.rs
//!     → one connection.rs per backend
//!         → security::permission (token)
//!         → heartbeat socket (PING out, frames in)
//!         → state.rs classifies every disconnect
//!     → live count + readiness gate
//! ```
//!
//! # Design Decisions
//! - A backend is live only while its heartbeat socket is open
//! - No HTTP probing; request failures do not change liveness
//! - Connections are never removed, only terminated

pub mod backend;
pub mod connection;
pub mod pool;
pub mod state;

pub use backend::BackendKey;
pub use connection::{BackendConnection, ConnectionStatus, TransportError};
pub use pool::BackendPool;
pub use state::{ConnectionState, DisconnectCause};
