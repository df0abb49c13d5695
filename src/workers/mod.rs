//! Supervised worker instantiations.
//!
//! # Data Flow
//! ```text
//! registry_watcher: register → sleep 3 s → register …   (keep-alive)
//! bus_consumer:     subscribe → drain deliveries → stream closes
//!                       → generation ends → restart after 15 s
//! time_sync:        bus_consumer specialization: parse time samples,
//!                       delegate adjustment to a ClockSync
//! (the fourth instantiation, the TCP accept loop, lives in net::server)
//! ```

pub mod bus_consumer;
pub mod registry_watcher;
pub mod time_sync;

pub use bus_consumer::{forward_to_queue, spawn_bus_consumer, DeliveryHandler};
pub use registry_watcher::{spawn_registry_watcher, ServiceIdentity};
pub use time_sync::{spawn_time_sync, ClockSync, SystemClockSync, TimeSyncMode};
