//! Connection identity, state machine and the paired send/recv loops.
//!
//! # Responsibilities
//! - Process-lifetime unique connection IDs
//! - Track lifecycle state (Connected → Active → Disconnecting → Cleaned)
//! - Cooperative, idempotent disconnect shared by both loops
//! - FIFO outbound queue drained by the send loop

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};

use crate::session::SessionHandler;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is sufficient: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Read buffer size for the recv loop.
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Session state sits in the pool, not bound to a socket.
    Idle = 0,
    /// Socket bound, registered, loops not yet running.
    Connected = 1,
    /// Send and recv loops both running.
    Active = 2,
    /// Either side requested close; loops are winding down.
    Disconnecting = 3,
    /// Session state reset and returned to the pool.
    Cleaned = 4,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Connected,
            2 => Self::Active,
            3 => Self::Disconnecting,
            _ => Self::Cleaned,
        }
    }
}

/// One accepted socket: identity, session state and the outbound queue.
///
/// Shared between the two connection loops, the dispatcher and the status
/// aggregator; all mutation goes through interior synchronization.
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    handler: Mutex<Option<Box<dyn SessionHandler>>>,
    outbound_tx: mpsc::UnboundedSender<Vec<u8>>,
    closed: AtomicBool,
    state: AtomicU8,
    cancel: watch::Sender<bool>,
}

impl Connection {
    /// Bind session state to an accepted socket's identity. The returned
    /// receiver feeds the send loop; the watch receiver signals disconnect.
    pub(crate) fn new(
        handler: Box<dyn SessionHandler>,
        peer: SocketAddr,
    ) -> (
        std::sync::Arc<Self>,
        mpsc::UnboundedReceiver<Vec<u8>>,
        watch::Receiver<bool>,
    ) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (cancel, cancel_rx) = watch::channel(false);
        let conn = std::sync::Arc::new(Self {
            id: ConnectionId::next(),
            peer,
            handler: Mutex::new(Some(handler)),
            outbound_tx,
            closed: AtomicBool::new(false),
            state: AtomicU8::new(ConnectionState::Connected as u8),
            cancel,
        });
        (conn, outbound_rx, cancel_rx)
    }

    /// This connection's process-lifetime unique ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address of the underlying socket.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Whether disconnect has been requested.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn mark_active(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Connected as u8,
            ConnectionState::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Offer an externally submitted payload to this connection's session.
    /// Returns `true` when the session claimed it and it was queued.
    pub fn offer(&self, payload: &[u8]) -> bool {
        if self.is_closed() {
            return false;
        }
        let claimed = match self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            Some(handler) => handler.claim(payload),
            None => return false,
        };
        if !claimed {
            return false;
        }
        self.outbound_tx.send(payload.to_vec()).is_ok()
    }

    /// The session's liveness token, or `None` while closing or when the
    /// session is not reportable.
    pub fn status_token(&self) -> Option<String> {
        if self.is_closed() {
            return None;
        }
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|h| h.status_token())
    }

    /// Request disconnect. Idempotent: only the first caller runs the
    /// teardown notification and returns `true`.
    pub fn disconnect(&self, reason: &str) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.state
            .store(ConnectionState::Disconnecting as u8, Ordering::Release);
        let _ = self.cancel.send(true);
        if let Some(handler) = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            handler.on_disconnect(reason);
        }
        tracing::debug!(connection_id = %self.id, peer = %self.peer, reason, "disconnecting");
        true
    }

    /// Detach the session state for pool return. The connection is left in
    /// the Cleaned state and keeps rejecting offers.
    pub(crate) fn take_handler(&self) -> Option<Box<dyn SessionHandler>> {
        self.state
            .store(ConnectionState::Cleaned as u8, Ordering::Release);
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn route_inbound(&self, data: &[u8]) {
        let replies = match self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            Some(handler) => handler.on_frame(data),
            None => return,
        };
        for frame in replies {
            if self.outbound_tx.send(frame).is_err() {
                break;
            }
        }
    }
}

/// Drain the outbound queue and write frames to the socket, FIFO.
/// Exits on cancellation, write failure, or queue teardown.
pub(crate) async fn send_loop(
    conn: std::sync::Arc<Connection>,
    mut writer: OwnedWriteHalf,
    mut outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            maybe = outbound_rx.recv() => match maybe {
                Some(frame) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        conn.disconnect(&format!("write failed: {e}"));
                        break;
                    }
                    tracing::trace!(connection_id = %conn.id(), bytes = frame.len(), "frame sent");
                }
                None => break,
            },
            _ = cancel.changed() => break,
        }
        if conn.is_closed() {
            break;
        }
    }
}

/// Read from the socket under an idle deadline and hand each chunk to the
/// session. Exits on cancellation, timeout, remote close, or read failure.
pub(crate) async fn recv_loop(
    conn: std::sync::Arc<Connection>,
    mut reader: OwnedReadHalf,
    read_timeout: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        if conn.is_closed() {
            break;
        }
        tokio::select! {
            _ = cancel.changed() => break,
            read = tokio::time::timeout(read_timeout, reader.read(&mut buf)) => match read {
                Err(_) => {
                    conn.disconnect("read timeout");
                    break;
                }
                Ok(Err(e)) => {
                    conn.disconnect(&format!("read failed: {e}"));
                    break;
                }
                Ok(Ok(0)) => {
                    conn.disconnect("remote close");
                    break;
                }
                Ok(Ok(n)) => conn.route_inbound(&buf[..n]),
            },
        }
    }
}
