//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_active_connections` (gauge): currently registered sockets
//! - `gateway_pool_idle` (gauge): recycled session objects waiting in the pool
//! - `gateway_dispatch_delivered_total` (counter): payload deliveries
//! - `gateway_worker_restarts_total` (counter, by worker): recovered crashes

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on the given address. Failure is
/// logged and metrics become no-ops; the gateway itself keeps running.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "failed to install metrics exporter"),
    }
}

pub fn record_active_connections(n: usize) {
    gauge!("gateway_active_connections").set(n as f64);
}

pub fn record_pool_idle(n: usize) {
    gauge!("gateway_pool_idle").set(n as f64);
}

pub fn record_dispatch(delivered: usize) {
    counter!("gateway_dispatch_delivered_total").increment(delivered as u64);
}

pub fn record_worker_restart(worker: &str) {
    counter!("gateway_worker_restarts_total", "worker" => worker.to_string()).increment(1);
}
