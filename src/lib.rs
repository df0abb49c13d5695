//! Self-healing device gateway toolkit.
//!
//! Wires a process into shared infrastructure (service registry, cache,
//! message bus) and runs a pooled TCP connection server whose long-lived
//! loops all follow the same pattern: run forever, recover from panics,
//! restart after a short backoff.

pub mod config;
pub mod dispatch;
pub mod external;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pool;
pub mod security;
pub mod session;
pub mod status;
pub mod supervisor;
pub mod workers;

pub use config::GatewayConfig;
pub use lifecycle::Shutdown;
pub use net::server::TcpGateway;
pub use session::SessionHandler;
