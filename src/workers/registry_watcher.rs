//! Supervised service-registry keep-alive.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::external::registry::ServiceRegistry;
use crate::lifecycle::Shutdown;
use crate::supervisor::Supervisor;

/// What this process registers as.
#[derive(Debug, Clone)]
pub struct ServiceIdentity {
    pub name: String,
    pub addr: String,
    pub port: u16,
}

/// Start the supervised watcher: one registration attempt per generation,
/// re-run every `cycle` for the life of the process. Registration failure
/// is logged and retried on the next cycle, never escalated.
pub fn spawn_registry_watcher(
    registry: Arc<dyn ServiceRegistry>,
    identity: ServiceIdentity,
    cycle: Duration,
    shutdown: &Shutdown,
) -> JoinHandle<()> {
    let supervisor = Supervisor::new("registry-watcher", cycle);
    let shutdown_rx = shutdown.subscribe();
    tokio::spawn(supervisor.run(shutdown_rx, move || {
        let registry = Arc::clone(&registry);
        let identity = identity.clone();
        async move {
            if let Err(e) = registry
                .register(&identity.name, &identity.addr, identity.port)
                .await
            {
                tracing::error!(
                    service = %identity.name,
                    error = %e,
                    "service registration failed"
                );
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::registry::InMemoryRegistry;

    #[tokio::test(flavor = "multi_thread")]
    async fn watcher_keeps_reregistering() {
        let registry = Arc::new(InMemoryRegistry::new());
        let shutdown = Shutdown::new();
        let handle = spawn_registry_watcher(
            Arc::clone(&registry) as Arc<dyn ServiceRegistry>,
            ServiceIdentity {
                name: "gw-test".to_string(),
                addr: "192.168.0.10".to_string(),
                port: 6820,
            },
            Duration::from_millis(10),
            &shutdown,
        );

        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.attempts() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("watcher stopped re-registering");

        assert_eq!(
            registry.last_registration(),
            Some(("gw-test".to_string(), "192.168.0.10".to_string(), 6820))
        );
        shutdown.trigger();
        let _ = handle.await;
    }
}
