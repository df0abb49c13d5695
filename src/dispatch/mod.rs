//! Outbound message dispatch.
//!
//! # Data Flow
//! ```text
//! application → bounded submission queue (blocks when full)
//!     → Dispatcher::run (supervised)
//!         → registry snapshot → Connection::offer per connection
//!             match-one: stop at the first claim
//!             broadcast: offer to every connection
//! ```
//!
//! # Design Decisions
//! - No ordering guarantee across connections; FIFO per connection via
//!   each connection's own outbound queue
//! - Connections mid-disconnect are skipped, not errored
//! - Zero live connections: the payload is dropped without error

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::net::registry::ConnectionRegistry;
use crate::observability::metrics;

/// How an externally submitted payload is offered to live connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Stop at the first connection that claims the payload.
    #[default]
    MatchOne,
    /// Offer the payload to every connection regardless of earlier claims.
    Broadcast,
}

/// Routes submitted payloads to live connections.
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    policy: DeliveryPolicy,
    // Shared with every supervised generation; only one runs at a time.
    submissions: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        policy: DeliveryPolicy,
        submissions: mpsc::Receiver<Vec<u8>>,
    ) -> Self {
        Self {
            registry,
            policy,
            submissions: Arc::new(Mutex::new(submissions)),
        }
    }

    /// Offer one payload to the live set. Returns how many connections
    /// accepted it.
    pub fn deliver(&self, payload: &[u8]) -> usize {
        let mut delivered = 0;
        for conn in self.registry.snapshot() {
            if conn.is_closed() {
                continue;
            }
            if conn.offer(payload) {
                delivered += 1;
                if self.policy == DeliveryPolicy::MatchOne {
                    break;
                }
            }
        }
        metrics::record_dispatch(delivered);
        tracing::trace!(delivered, policy = ?self.policy, "payload dispatched");
        delivered
    }

    /// One supervised generation: drain the submission queue until it is
    /// torn down or shutdown fires.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut rx = self.submissions.lock().await;
        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(payload) => {
                        self.deliver(&payload);
                    }
                    None => {
                        tracing::debug!("submission queue closed, dispatcher ending");
                        break;
                    }
                },
                _ = shutdown.recv() => break,
            }
        }
    }
}
