//! Message bus collaborator.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors surfaced by bus collaborators.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("publish failed: {0}")]
    Publish(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),
}

/// One message received from the bus.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub routing_key: String,
    pub body: Vec<u8>,
}

/// Outbound side of the bus. Publishes are fire-and-forget from the
/// gateway's point of view; the client library owns reconnection.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(
        &self,
        routing_key: &str,
        payload: &[u8],
        expiration: Duration,
    ) -> Result<(), BusError>;
}

/// Inbound side of the bus. Each supervised consumer generation opens a
/// fresh delivery stream; a closed stream ends only that generation.
#[async_trait]
pub trait BusConsumer: Send + Sync {
    async fn subscribe(&self, binding_keys: &[String]) -> Result<mpsc::Receiver<Delivery>, BusError>;
}

/// Match a routing key against an AMQP-style topic binding. Only the
/// trailing `#` wildcard is supported; that is all the crate uses.
fn key_matches(binding: &str, routing_key: &str) -> bool {
    match binding.strip_suffix(".#") {
        Some(prefix) => {
            routing_key == prefix || routing_key.starts_with(&format!("{prefix}."))
        }
        None => binding == "#" || binding == routing_key,
    }
}

struct Subscriber {
    binding_keys: Vec<String>,
    tx: mpsc::Sender<Delivery>,
}

/// Process-local bus for tests and the demo binary.
///
/// Records every publish and forwards deliveries to matching subscribers.
#[derive(Default)]
pub struct InMemoryBus {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// All payloads published so far under keys matching `binding`.
    pub fn published_matching(&self, binding: &str) -> Vec<Vec<u8>> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(key, _)| key_matches(binding, key))
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Total number of publishes observed.
    pub fn published_count(&self) -> usize {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Inject a delivery, as if a remote producer had published it.
    pub fn inject(&self, routing_key: &str, body: &[u8]) {
        let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subs.retain(|sub| !sub.tx.is_closed());
        for sub in subs.iter() {
            if sub.binding_keys.iter().any(|b| key_matches(b, routing_key)) {
                let _ = sub.tx.try_send(Delivery {
                    routing_key: routing_key.to_string(),
                    body: body.to_vec(),
                });
            }
        }
    }

    /// Drop all subscriber streams, simulating a broker-side close.
    pub fn close_subscribers(&self) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(
        &self,
        routing_key: &str,
        payload: &[u8],
        _expiration: Duration,
    ) -> Result<(), BusError> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((routing_key.to_string(), payload.to_vec()));
        self.inject(routing_key, payload);
        Ok(())
    }
}

#[async_trait]
impl BusConsumer for InMemoryBus {
    async fn subscribe(&self, binding_keys: &[String]) -> Result<mpsc::Receiver<Delivery>, BusError> {
        let (tx, rx) = mpsc::channel(256);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                binding_keys: binding_keys.to_vec(),
                tx,
            });
        Ok(rx)
    }
}
