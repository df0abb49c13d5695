//! Service registry collaborator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by registry collaborators.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registration failed: {0}")]
    Register(String),
}

/// External service registry. `register` performs a single registration
/// attempt; keep-alive is achieved by the supervised watcher re-running it
/// on a fixed cycle.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn register(&self, name: &str, addr: &str, port: u16) -> Result<(), RegistryError>;
}

/// Process-local registry for tests and the demo binary.
#[derive(Default)]
pub struct InMemoryRegistry {
    attempts: AtomicU64,
    last: Mutex<Option<(String, String, u16)>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registration attempts observed.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Most recent registration, if any.
    pub fn last_registration(&self) -> Option<(String, String, u16)> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryRegistry {
    async fn register(&self, name: &str, addr: &str, port: u16) -> Result<(), RegistryError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((name.to_string(), addr.to_string(), port));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registration_is_recorded() {
        let registry = InMemoryRegistry::new();
        registry.register("gw1", "192.168.0.10", 6820).await.unwrap();
        registry.register("gw1", "192.168.0.10", 6820).await.unwrap();
        assert_eq!(registry.attempts(), 2);
        assert_eq!(
            registry.last_registration(),
            Some(("gw1".to_string(), "192.168.0.10".to_string(), 6820))
        );
    }
}
