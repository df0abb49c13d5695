//! Connection admission policy.
//!
//! # Data Flow
//! ```text
//! cache key `legalips/<source>` → AllowListRefresher (supervised, 60 s)
//!     → ArcSwap replace → IpAllowList::check on the accept path
//! ```
//!
//! # Design Decisions
//! - Checks are lock-free reads on the accept path
//! - A denied socket is closed before it ever enters the lifecycle
//! - An unavailable cache keeps the previous list in force

pub mod allowlist;

pub use allowlist::{AllowListRefresher, IpAllowList};
