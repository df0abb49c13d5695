//! Registry of currently open connections.
//!
//! # Responsibilities
//! - Concurrent map from connection ID to live connection
//! - Lock-free reads for dispatch and status walks
//! - No ordering guarantee; iteration order is irrelevant

use std::sync::Arc;

use dashmap::DashMap;

use crate::net::connection::{Connection, ConnectionId};

/// Concurrent map of open connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: DashMap<ConnectionId, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection right after handshake.
    pub fn insert(&self, conn: Arc<Connection>) {
        self.inner.insert(conn.id(), conn);
    }

    /// Remove a connection during cleanup.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.inner.remove(&id).map(|(_, conn)| conn)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Snapshot of the live set. Taken so that callers never hold map
    /// shard locks while talking to a connection.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.inner.iter().map(|e| Arc::clone(e.value())).collect()
    }
}
