//! Periodic liveness aggregation and publication.
//!
//! # Data Flow
//! ```text
//! tick (15 s) → registry snapshot → Connection::status_token per entry
//!     → StatusSnapshot (serde_json)
//!         → bus key  devonline.<server-name>.<mq-flag>  (15 s expiration)
//!         → cache key devonline/<server-name>/<mq-flag> (60 s TTL)
//! every 4th tick → coarse summary in the log
//! ```
//!
//! # Design Decisions
//! - Publishes are fire-and-forget: failures are logged, never retried
//!   here (the bus client owns reconnection)
//! - The snapshot is ephemeral; this subsystem persists nothing

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::StatusConfig;
use crate::external::bus::MessageBus;
use crate::external::cache::CacheStore;
use crate::net::registry::ConnectionRegistry;
use crate::observability::metrics;
use crate::pool::SessionPool;
use crate::session::SessionHandler;

/// Aggregate of every reportable connection's liveness token at one
/// point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub server: String,
    pub port: u16,
    pub flag: String,
    /// Unix seconds at collection time.
    pub generated_at: u64,
    /// Opaque per-session tokens; sessions reporting `None` are absent.
    pub sessions: Vec<String>,
}

/// Walks the registry on a fixed tick and republishes the snapshot.
pub struct StatusAggregator {
    registry: Arc<ConnectionRegistry>,
    pool: Arc<SessionPool<Box<dyn SessionHandler>>>,
    bus: Arc<dyn MessageBus>,
    cache: Arc<dyn CacheStore>,
    config: StatusConfig,
    port: u16,
}

impl StatusAggregator {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        pool: Arc<SessionPool<Box<dyn SessionHandler>>>,
        bus: Arc<dyn MessageBus>,
        cache: Arc<dyn CacheStore>,
        config: StatusConfig,
        port: u16,
    ) -> Self {
        Self {
            registry,
            pool,
            bus,
            cache,
            config,
            port,
        }
    }

    /// Collect the current snapshot. Connections mid-disconnect or not
    /// reportable are skipped.
    pub fn collect(&self) -> StatusSnapshot {
        let sessions: Vec<String> = self
            .registry
            .snapshot()
            .iter()
            .filter_map(|conn| conn.status_token())
            .collect();
        StatusSnapshot {
            server: self.config.server_name.clone(),
            port: self.port,
            flag: self.config.mq_flag.clone(),
            generated_at: unix_now(),
            sessions,
        }
    }

    /// Serialize and hand the snapshot to both collaborators.
    pub async fn publish_snapshot(&self) -> usize {
        let snapshot = self.collect();
        let reportable = snapshot.sessions.len();
        let serialized = match serde_json::to_string(&snapshot) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize status snapshot");
                return reportable;
            }
        };

        let bus_key = format!(
            "devonline.{}.{}",
            self.config.server_name, self.config.mq_flag
        );
        if let Err(e) = self
            .bus
            .publish(
                &bus_key,
                serialized.as_bytes(),
                Duration::from_secs(self.config.publish_expiration_secs),
            )
            .await
        {
            tracing::warn!(key = %bus_key, error = %e, "status publish failed");
        }

        let cache_key = format!(
            "devonline/{}/{}",
            self.config.server_name, self.config.mq_flag
        );
        if let Err(e) = self
            .cache
            .set(
                &cache_key,
                &serialized,
                Duration::from_secs(self.config.cache_ttl_secs),
            )
            .await
        {
            tracing::warn!(key = %cache_key, error = %e, "status cache write failed");
        }

        metrics::record_active_connections(self.registry.len());
        metrics::record_pool_idle(self.pool.len());
        reportable
    }

    /// One supervised generation: tick forever, summarizing every
    /// `summary_every` ticks.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let period = Duration::from_secs(self.config.interval_secs);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks_since_summary = 0u32;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reportable = self.publish_snapshot().await;
                    ticks_since_summary += 1;
                    if ticks_since_summary >= self.config.summary_every.max(1) {
                        ticks_since_summary = 0;
                        tracing::info!(
                            port = self.port,
                            active_clients = reportable,
                            clients_pool = self.pool.len(),
                            "status summary"
                        );
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
