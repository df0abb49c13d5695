//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load TOML (loader.rs) → Validate (validation.rs) → GatewayConfig
//!     → constructed once, passed by reference into component constructors
//! ```
//!
//! # Design Decisions
//! - No global mutable configuration: every component receives the struct
//!   (or its section) at construction time
//! - All sections carry `#[serde(default)]` so partial files are valid

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AllowListConfig, DispatchConfig, GatewayConfig, ListenerConfig, ObservabilityConfig,
    StatusConfig, SupervisorConfig, TimeSyncConfig,
};
