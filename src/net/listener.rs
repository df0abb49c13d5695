//! TCP listener with the gateway's port policy.
//!
//! # Responsibilities
//! - Enforce the allowed bind range [1000, 65535] at startup
//! - Bind and hand out accepted sockets
//! - Leave accept-retry pacing to the accept loop

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use crate::config::ListenerConfig;

/// Errors surfaced when starting the TCP subsystem.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Bind port outside the allowed range; the subsystem does not start.
    #[error("forbidden port range: {0} not in [1000, 65535]")]
    ForbiddenPort(u16),

    /// Failed to bind the listen socket.
    #[error("failed to bind: {0}")]
    Bind(std::io::Error),

    /// `start` was called more than once on the same gateway.
    #[error("gateway already started")]
    AlreadyStarted,
}

/// The gateway's listen socket.
pub struct GatewayListener {
    inner: TcpListener,
}

impl GatewayListener {
    /// Bind on the configured port after checking the allowed range.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, GatewayError> {
        if config.port < 1000 {
            return Err(GatewayError::ForbiddenPort(config.port));
        }
        let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
        let inner = TcpListener::bind(addr).await.map_err(GatewayError::Bind)?;
        tracing::info!(port = config.port, "listener bound");
        Ok(Self { inner })
    }

    /// Wrap an already-bound listener. Used by tests and by embedders that
    /// manage their own sockets.
    pub fn from_listener(inner: TcpListener) -> Self {
        Self { inner }
    }

    /// Accept one connection.
    pub async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        self.inner.accept().await
    }

    /// Local address this listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
