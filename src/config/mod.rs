//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, environment overrides)
//!     → deploy.rs (expand deploy topology into backend URLs)
//!     → validation.rs (semantic checks)
//!     → BalancerConfig (validated, immutable)
//!     → shared by value/Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the backend set is static
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod deploy;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_exchange_token, ConfigError};
pub use schema::{
    AdminConfig, BackendsConfig, BalancerConfig, HeartbeatConfig, ListenerConfig,
    ObservabilityConfig, ProxySettings, SecurityConfig,
};
