//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Backend connection (ToConnect):
//!     → permission.rs (GET permission route with the exchange secret)
//!     → token + application descriptor
//!     → token attached to the heartbeat dial
//! ```
//!
//! # Design Decisions
//! - The exchange secret is read once at startup and never logged
//! - Tokens are per connection attempt; a reconnect asks again

pub mod permission;

pub use permission::{AppDescriptor, HandshakeError, Permission, PermissionClient};
