//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, port policy, accept retry)
//!     → allow-list check (security::allowlist)
//!     → server.rs (pool checkout, registry insert, task spawn)
//!     → connection.rs (send/recv loops, cooperative disconnect)
//!     → cleanup: registry remove, handler reset, pool return
//!
//! Connection states:
//!     Idle → Connected → Active → Disconnecting → Cleaned
//! ```
//!
//! # Design Decisions
//! - Exactly two long-lived tasks per connection (send, recv)
//! - Disconnect is cooperative and idempotent: a closed flag plus a
//!   cancellation watch, no hard preemption
//! - Session state is recycled through the pool, never freed

pub mod connection;
pub mod listener;
pub mod registry;
pub mod server;

pub use connection::{Connection, ConnectionId, ConnectionState};
pub use listener::{GatewayError, GatewayListener};
pub use registry::ConnectionRegistry;
pub use server::TcpGateway;
