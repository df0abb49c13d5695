//! Out-of-process collaborators.
//!
//! # Data Flow
//! ```text
//! status aggregator → MessageBus::publish / CacheStore::set
//! allow-list refresher → CacheStore::get
//! bus-consumer / time-sync workers ← BusConsumer::subscribe
//! registry watcher → ServiceRegistry::register
//! ```
//!
//! # Design Decisions
//! - Every collaborator is a trait object; the gateway never links a
//!   vendor client directly
//! - Transport loss is the client library's problem: publishes are
//!   fire-and-forget, consumer streams end their generation and the
//!   supervisor re-subscribes
//! - In-memory implementations live here for tests and the demo binary

pub mod bus;
pub mod cache;
pub mod registry;

pub use bus::{BusConsumer, BusError, Delivery, InMemoryBus, MessageBus};
pub use cache::{CacheError, CacheStore, InMemoryCache};
pub use registry::{InMemoryRegistry, RegistryError, ServiceRegistry};
