//! Shared fixtures for the gateway integration tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use devgate::config::GatewayConfig;
use devgate::external::{InMemoryBus, InMemoryCache};
use devgate::net::listener::GatewayListener;
use devgate::session::{SessionFactory, SessionHandler};
use devgate::{Shutdown, TcpGateway};

/// Session that claims payloads by prefix and acks every inbound frame.
pub struct TestSession {
    pub claim_prefix: &'static [u8],
}

impl SessionHandler for TestSession {
    fn reset(&mut self) {}
    fn on_connect(&mut self, _peer: SocketAddr) {}
    fn on_disconnect(&mut self, _reason: &str) {}
    fn on_frame(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        vec![data.to_vec()]
    }
    fn claim(&mut self, payload: &[u8]) -> bool {
        payload.starts_with(self.claim_prefix)
    }
    fn status_token(&self) -> Option<String> {
        Some("test-session".to_string())
    }
}

/// Factory that counts fresh allocations, for pool-reuse assertions.
pub fn counting_factory(
    claim_prefix: &'static [u8],
    allocations: Arc<AtomicUsize>,
) -> SessionFactory {
    Arc::new(move || {
        allocations.fetch_add(1, Ordering::SeqCst);
        Box::new(TestSession { claim_prefix }) as Box<dyn SessionHandler>
    })
}

pub struct TestGateway {
    pub gateway: Arc<TcpGateway>,
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub bus: Arc<InMemoryBus>,
    pub cache: Arc<InMemoryCache>,
}

/// Start a gateway on an ephemeral loopback port.
pub async fn start_gateway(config: GatewayConfig, factory: SessionFactory) -> TestGateway {
    let bus = Arc::new(InMemoryBus::new());
    let cache = Arc::new(InMemoryCache::new());
    let gateway = Arc::new(TcpGateway::new(config, factory, bus.clone(), cache.clone()));

    let bound = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = bound.local_addr().unwrap();
    let shutdown = Shutdown::new();
    gateway
        .start_with_listener(GatewayListener::from_listener(bound), &shutdown)
        .unwrap();

    TestGateway {
        gateway,
        addr,
        shutdown,
        bus,
        cache,
    }
}

/// Poll until `check` holds, panicking after five seconds.
pub async fn wait_for<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for: {what}"));
}
