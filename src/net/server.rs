//! The pooled TCP connection server.
//!
//! # Responsibilities
//! - Own the accept loop (supervised, per the listener restart policy)
//! - Check admissions against the allow-list
//! - Check session state out of the pool and back in around each socket
//! - Start the dispatcher, status aggregator and allow-list refresher

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinError;

use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::external::bus::MessageBus;
use crate::external::cache::CacheStore;
use crate::lifecycle::Shutdown;
use crate::net::connection::{recv_loop, send_loop, Connection};
use crate::net::listener::{GatewayError, GatewayListener};
use crate::net::registry::ConnectionRegistry;
use crate::observability::metrics;
use crate::pool::SessionPool;
use crate::security::allowlist::{AllowListRefresher, IpAllowList};
use crate::session::{SessionFactory, SessionHandler};
use crate::status::StatusAggregator;
use crate::supervisor::{backoff, panic_message, Supervisor};

/// The TCP service: accept loop, connection lifecycles, dispatch and
/// status aggregation, wired to the external collaborators.
pub struct TcpGateway {
    config: GatewayConfig,
    factory: SessionFactory,
    pool: Arc<SessionPool<Box<dyn SessionHandler>>>,
    registry: Arc<ConnectionRegistry>,
    allowlist: Arc<IpAllowList>,
    bus: Arc<dyn MessageBus>,
    cache: Arc<dyn CacheStore>,
    submit_tx: mpsc::Sender<Vec<u8>>,
    submit_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
}

impl TcpGateway {
    pub fn new(
        config: GatewayConfig,
        factory: SessionFactory,
        bus: Arc<dyn MessageBus>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        let (submit_tx, submit_rx) = mpsc::channel(config.dispatch.queue_capacity.max(1));
        Self {
            config,
            factory,
            pool: Arc::new(SessionPool::new()),
            registry: Arc::new(ConnectionRegistry::new()),
            allowlist: Arc::new(IpAllowList::new()),
            bus,
            cache,
            submit_tx,
            submit_rx: Mutex::new(Some(submit_rx)),
        }
    }

    /// Handle for submitting outbound payloads. The queue is bounded;
    /// submitters block once it is full.
    pub fn submitter(&self) -> mpsc::Sender<Vec<u8>> {
        self.submit_tx.clone()
    }

    /// The live connection set.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Idle objects currently in the session pool.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// The admission allow-list (empty and unused unless enabled).
    pub fn allowlist(&self) -> Arc<IpAllowList> {
        Arc::clone(&self.allowlist)
    }

    /// Bind on the configured port and start every worker. The port check
    /// and the bind are the only synchronous failures; after this, nothing
    /// escalates beyond a log line.
    pub async fn start(&self, shutdown: &Shutdown) -> Result<(), GatewayError> {
        let listener = match GatewayListener::bind(&self.config.listener).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(port = self.config.listener.port, error = %e, "TCP subsystem not started");
                return Err(e);
            }
        };
        self.start_with_listener(listener, shutdown)
    }

    /// Start every worker on an already-bound listener.
    pub fn start_with_listener(
        &self,
        listener: GatewayListener,
        shutdown: &Shutdown,
    ) -> Result<(), GatewayError> {
        let submit_rx = self
            .submit_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(GatewayError::AlreadyStarted)?;
        let port = listener
            .local_addr()
            .map(|a| a.port())
            .unwrap_or(self.config.listener.port);

        // Dispatcher.
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&self.registry),
            self.config.dispatch.policy,
            submit_rx,
        ));
        let gen_shutdown = shutdown.subscribe();
        tokio::spawn(
            Supervisor::new("dispatcher", backoff::CORE_RESTART).run(
                shutdown.subscribe(),
                move || {
                    let dispatcher = Arc::clone(&dispatcher);
                    let rx = gen_shutdown.resubscribe();
                    async move { dispatcher.run(rx).await }
                },
            ),
        );

        // Status aggregator.
        let aggregator = Arc::new(StatusAggregator::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.pool),
            Arc::clone(&self.bus),
            Arc::clone(&self.cache),
            self.config.status.clone(),
            port,
        ));
        let gen_shutdown = shutdown.subscribe();
        tokio::spawn(
            Supervisor::new("status-aggregator", backoff::CORE_RESTART).run(
                shutdown.subscribe(),
                move || {
                    let aggregator = Arc::clone(&aggregator);
                    let rx = gen_shutdown.resubscribe();
                    async move { aggregator.run(rx).await }
                },
            ),
        );

        // Allow-list refresher.
        if self.config.allowlist.enabled {
            let refresher = Arc::new(AllowListRefresher::new(
                Arc::clone(&self.cache),
                Arc::clone(&self.allowlist),
                &self.config.allowlist.source,
                Duration::from_secs(self.config.allowlist.refresh_secs),
            ));
            let gen_shutdown = shutdown.subscribe();
            tokio::spawn(
                Supervisor::new("allowlist-refresher", backoff::CORE_RESTART).run(
                    shutdown.subscribe(),
                    move || {
                        let refresher = Arc::clone(&refresher);
                        let rx = gen_shutdown.resubscribe();
                        async move { refresher.run(rx).await }
                    },
                ),
            );
        }

        // Accept loop.
        let listener = Arc::new(listener);
        let ctx = Arc::new(AcceptContext {
            registry: Arc::clone(&self.registry),
            pool: Arc::clone(&self.pool),
            factory: Arc::clone(&self.factory),
            allowlist: self
                .config
                .allowlist
                .enabled
                .then(|| Arc::clone(&self.allowlist)),
            read_timeout: Duration::from_secs(self.config.listener.read_timeout_secs.max(1)),
        });
        if self.config.listener.restart_on_crash {
            tokio::spawn(
                Supervisor::new("tcp-accept", backoff::CORE_RESTART).run(
                    shutdown.subscribe(),
                    move || {
                        let listener = Arc::clone(&listener);
                        let ctx = Arc::clone(&ctx);
                        async move { accept_loop(listener, ctx).await }
                    },
                ),
            );
        } else {
            let handle = tokio::spawn(accept_loop(listener, ctx));
            tokio::spawn(async move {
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        tracing::error!(
                            port,
                            error = %panic_message(e),
                            "TCP listener crashed, NEEDS RESTART (restart disabled by config)"
                        );
                    }
                }
            });
        }

        tracing::info!(port, "TCP service started");
        Ok(())
    }
}

struct AcceptContext {
    registry: Arc<ConnectionRegistry>,
    pool: Arc<SessionPool<Box<dyn SessionHandler>>>,
    factory: SessionFactory,
    allowlist: Option<Arc<IpAllowList>>,
    read_timeout: Duration,
}

async fn accept_loop(listener: Arc<GatewayListener>, ctx: Arc<AcceptContext>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                tokio::time::sleep(backoff::ACCEPT_RETRY).await;
                continue;
            }
        };
        if let Some(list) = &ctx.allowlist {
            if !list.check(peer.ip()) {
                tracing::warn!(peer = %peer, "unlisted address, kicked out");
                drop(stream);
                continue;
            }
        }
        tracing::info!(peer = %peer, "connection accepted");

        let mut handler = ctx.pool.get().unwrap_or_else(|| (ctx.factory)());
        handler.reset();
        handler.on_connect(peer);
        let (conn, outbound_rx, cancel_rx) = Connection::new(handler, peer);
        ctx.registry.insert(Arc::clone(&conn));
        metrics::record_active_connections(ctx.registry.len());
        metrics::record_pool_idle(ctx.pool.len());

        tokio::spawn(run_connection(
            conn,
            stream,
            outbound_rx,
            cancel_rx,
            Arc::clone(&ctx),
        ));
    }
}

/// Drive one connection's paired loops, then clean up: registry removal,
/// handler reset, pool return. Loop panics are contained here and turn
/// into an ordinary disconnect.
async fn run_connection(
    conn: Arc<Connection>,
    stream: TcpStream,
    outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    cancel_rx: tokio::sync::watch::Receiver<bool>,
    ctx: Arc<AcceptContext>,
) {
    let (reader, writer) = stream.into_split();
    let mut send = tokio::spawn(send_loop(
        Arc::clone(&conn),
        writer,
        outbound_rx,
        cancel_rx.clone(),
    ));
    let mut recv = tokio::spawn(recv_loop(
        Arc::clone(&conn),
        reader,
        ctx.read_timeout,
        cancel_rx,
    ));
    conn.mark_active();

    let send_finished_first = tokio::select! {
        joined = &mut send => {
            report_loop_exit(&conn, "send", joined);
            true
        }
        joined = &mut recv => {
            report_loop_exit(&conn, "recv", joined);
            false
        }
    };
    conn.disconnect("sibling loop finished");
    if send_finished_first {
        report_loop_exit(&conn, "recv", recv.await);
    } else {
        report_loop_exit(&conn, "send", send.await);
    }

    ctx.registry.remove(conn.id());
    if let Some(mut handler) = conn.take_handler() {
        handler.reset();
        ctx.pool.put(handler);
    }
    metrics::record_active_connections(ctx.registry.len());
    metrics::record_pool_idle(ctx.pool.len());
    tracing::info!(connection_id = %conn.id(), peer = %conn.peer(), "connection cleaned");
}

fn report_loop_exit(conn: &Connection, side: &str, joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            conn.disconnect(&format!("{side} loop crashed: {}", panic_message(e)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::bus::InMemoryBus;
    use crate::external::cache::InMemoryCache;
    use crate::session::EchoSession;

    fn gateway() -> TcpGateway {
        TcpGateway::new(
            GatewayConfig::default(),
            Arc::new(|| Box::new(EchoSession::default()) as Box<dyn SessionHandler>),
            Arc::new(InMemoryBus::new()),
            Arc::new(InMemoryCache::new()),
        )
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let gw = gateway();
        let shutdown = Shutdown::new();

        let bound = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        gw.start_with_listener(GatewayListener::from_listener(bound), &shutdown)
            .unwrap();

        let bound = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        match gw.start_with_listener(GatewayListener::from_listener(bound), &shutdown) {
            Err(GatewayError::AlreadyStarted) => {}
            other => panic!("expected AlreadyStarted, got {:?}", other.map(|_| ())),
        }
        shutdown.trigger();
    }

    #[tokio::test]
    async fn forbidden_port_does_not_start() {
        let mut config = GatewayConfig::default();
        config.listener.port = 80;
        let gw = TcpGateway::new(
            config,
            Arc::new(|| Box::new(EchoSession::default()) as Box<dyn SessionHandler>),
            Arc::new(InMemoryBus::new()),
            Arc::new(InMemoryCache::new()),
        );
        let shutdown = Shutdown::new();
        assert!(matches!(
            gw.start(&shutdown).await,
            Err(GatewayError::ForbiddenPort(80))
        ));
    }
}
