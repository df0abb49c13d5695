//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::dispatch::DeliveryPolicy;
use crate::supervisor::backoff;
use crate::workers::time_sync::TimeSyncMode;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// TCP listener settings (bind port, timeouts).
    pub listener: ListenerConfig,

    /// Outbound message dispatch settings.
    pub dispatch: DispatchConfig,

    /// Status aggregation and publication settings.
    pub status: StatusConfig,

    /// IP allow-list settings.
    pub allowlist: AllowListConfig,

    /// Supervised-worker restart pacing.
    pub supervisor: SupervisorConfig,

    /// Time synchronization settings.
    pub time_sync: TimeSyncConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// TCP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind port. Must be within [1000, 65535].
    pub port: u16,

    /// Idle read deadline in seconds; a silent peer is disconnected after
    /// this long.
    pub read_timeout_secs: u64,

    /// Whether a crashed accept loop is restarted by its supervisor. When
    /// false the crash is logged as needing a restart and accepting stops.
    pub restart_on_crash: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: 6820,
            read_timeout_secs: 60,
            restart_on_crash: true,
        }
    }
}

/// Dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Delivery policy for externally submitted payloads.
    pub policy: DeliveryPolicy,

    /// Capacity of the submission queue; submitters block once full.
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            policy: DeliveryPolicy::MatchOne,
            queue_capacity: 5000,
        }
    }
}

/// Status aggregation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Server name used in bus routing keys and cache keys.
    pub server_name: String,

    /// Extra flag distinguishing parallel gateways on one server.
    pub mq_flag: String,

    /// Snapshot interval in seconds.
    pub interval_secs: u64,

    /// Bus publish expiration in seconds.
    pub publish_expiration_secs: u64,

    /// Cache entry TTL in seconds.
    pub cache_ttl_secs: u64,

    /// A coarse log summary is written every this many ticks.
    pub summary_every: u32,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            server_name: "devgate".to_string(),
            mq_flag: "0".to_string(),
            interval_secs: 15,
            publish_expiration_secs: 15,
            cache_ttl_secs: 60,
            summary_every: 4,
        }
    }
}

/// IP allow-list configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AllowListConfig {
    /// Only accept sockets from listed addresses.
    pub enabled: bool,

    /// Source tag; the list is read from cache key `legalips/<source>`.
    pub source: String,

    /// Refresh cycle in seconds.
    pub refresh_secs: u64,
}

impl Default for AllowListConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            source: "devgate".to_string(),
            refresh_secs: 60,
        }
    }
}

/// Supervised-worker restart pacing. Defaults come from the constants in
/// `supervisor::backoff`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Backoff between bus-consumer and time-sync generations, seconds.
    pub consumer_restart_secs: u64,

    /// Cycle between registry re-registration attempts, seconds.
    pub registry_restart_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            consumer_restart_secs: backoff::CONSUMER_RESTART.as_secs(),
            registry_restart_secs: backoff::REGISTRY_RESTART.as_secs(),
        }
    }
}

/// Time synchronization configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeSyncConfig {
    /// Adjustment mode.
    pub mode: TimeSyncMode,

    /// Topic binding for time-reference broadcasts.
    pub binding_key: String,
}

impl Default for TimeSyncConfig {
    fn default() -> Self {
        Self {
            mode: TimeSyncMode::Off,
            binding_key: "timesync.#".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
