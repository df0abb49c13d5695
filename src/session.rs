//! Plug-in contract for per-connection protocol state.
//!
//! The gateway owns sockets, identity, queues and the send/receive loops;
//! the embedding application supplies a [`SessionHandler`] that owns
//! protocol state. Handlers are recycled through the session pool, so
//! `reset` must leave the object indistinguishable from a fresh one.

use std::net::SocketAddr;
use std::sync::Arc;

/// Per-connection protocol state supplied by the embedding application.
pub trait SessionHandler: Send + 'static {
    /// Prepare internal buffers for first use or pool reuse.
    fn reset(&mut self);

    /// A socket has been bound to this session.
    fn on_connect(&mut self, peer: SocketAddr);

    /// The connection is being torn down. Called exactly once per lifecycle.
    fn on_disconnect(&mut self, reason: &str);

    /// Inbound bytes from the transport. Returned frames are queued on this
    /// connection's outbound queue in order.
    fn on_frame(&mut self, data: &[u8]) -> Vec<Vec<u8>>;

    /// Routing predicate for externally submitted payloads: `true` claims
    /// the payload for this connection.
    fn claim(&mut self, payload: &[u8]) -> bool;

    /// Opaque liveness token for the status aggregator. `None` means this
    /// session is not reportable.
    fn status_token(&self) -> Option<String>;
}

/// Factory for fresh session state, used when the pool is empty.
pub type SessionFactory = Arc<dyn Fn() -> Box<dyn SessionHandler> + Send + Sync>;

/// Reference session: echoes every inbound frame and claims every payload.
///
/// Backs the demo binary and doubles as a worked example of the contract.
#[derive(Debug, Default)]
pub struct EchoSession {
    peer: Option<SocketAddr>,
    frames_in: u64,
}

impl SessionHandler for EchoSession {
    fn reset(&mut self) {
        self.peer = None;
        self.frames_in = 0;
    }

    fn on_connect(&mut self, peer: SocketAddr) {
        self.peer = Some(peer);
    }

    fn on_disconnect(&mut self, reason: &str) {
        tracing::debug!(peer = ?self.peer, reason, "echo session closed");
    }

    fn on_frame(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.frames_in += 1;
        vec![data.to_vec()]
    }

    fn claim(&mut self, _payload: &[u8]) -> bool {
        true
    }

    fn status_token(&self) -> Option<String> {
        let peer = self.peer?;
        Some(format!(
            "{{\"peer\":\"{}\",\"frames_in\":{}}}",
            peer, self.frames_in
        ))
    }
}
