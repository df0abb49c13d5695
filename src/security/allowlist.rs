//! Periodically refreshed IP allow-list.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::broadcast;

use crate::external::cache::CacheStore;

/// Set of remote addresses allowed to connect.
///
/// An empty list denies everything: the gateway only trusts what the
/// cache has explicitly published.
pub struct IpAllowList {
    inner: ArcSwap<HashSet<IpAddr>>,
}

impl IpAllowList {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(HashSet::new()),
        }
    }

    /// Replace the list from a comma-separated address string. Entries
    /// that do not parse are dropped with a warning.
    pub fn replace(&self, raw: &str) {
        let mut set = HashSet::new();
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.parse::<IpAddr>() {
                Ok(ip) => {
                    set.insert(ip);
                }
                Err(_) => tracing::warn!(entry = part, "unparseable allow-list entry dropped"),
            }
        }
        self.inner.store(Arc::new(set));
    }

    /// Whether the remote address may connect.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.inner.load().contains(&ip)
    }

    /// Number of listed addresses.
    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    /// Whether no addresses are listed.
    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }
}

impl Default for IpAllowList {
    fn default() -> Self {
        Self::new()
    }
}

/// Supervised worker body that keeps an [`IpAllowList`] in sync with the
/// cache key `legalips/<source>`.
pub struct AllowListRefresher {
    cache: Arc<dyn CacheStore>,
    list: Arc<IpAllowList>,
    key: String,
    refresh: Duration,
}

impl AllowListRefresher {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        list: Arc<IpAllowList>,
        source: &str,
        refresh: Duration,
    ) -> Self {
        Self {
            cache,
            list,
            key: format!("legalips/{source}"),
            refresh,
        }
    }

    /// One supervised generation: refresh immediately, then on each cycle.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            match self.cache.get(&self.key).await {
                Ok(Some(raw)) => {
                    self.list.replace(&raw);
                    tracing::debug!(key = %self.key, entries = self.list.len(), "allow-list refreshed");
                }
                Ok(None) => {
                    tracing::debug!(key = %self.key, "allow-list key absent, keeping previous list");
                }
                Err(e) => {
                    tracing::warn!(key = %self.key, error = %e, "allow-list refresh failed");
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.refresh) => {}
                _ = shutdown.recv() => break,
            }
        }
    }
}
