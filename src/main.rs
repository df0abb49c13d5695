//! Demo gateway binary.
//!
//! Runs the full worker set against the in-memory collaborators with the
//! echo session, so the service can be exercised end to end with nothing
//! but `nc`. Production embedders depend on the library crate and plug in
//! real bus/cache/registry clients and their own [`SessionHandler`].

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use devgate::config::{load_config, GatewayConfig};
use devgate::external::{
    BusConsumer, InMemoryBus, InMemoryCache, InMemoryRegistry, ServiceRegistry,
};
use devgate::observability::{logging, metrics};
use devgate::session::{EchoSession, SessionHandler};
use devgate::workers::time_sync::{SystemClockSync, TimeSyncMode};
use devgate::workers::{
    forward_to_queue, spawn_bus_consumer, spawn_registry_watcher, spawn_time_sync, ServiceIdentity,
};
use devgate::{Shutdown, TcpGateway};

#[derive(Parser, Debug)]
#[command(name = "devgate", about = "Self-healing device gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    logging::init(&config.observability);
    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?);
    }

    let shutdown = Shutdown::new();
    let bus = Arc::new(InMemoryBus::new());
    let cache = Arc::new(InMemoryCache::new());
    let registry = Arc::new(InMemoryRegistry::new());

    let gateway = Arc::new(TcpGateway::new(
        config.clone(),
        Arc::new(|| Box::new(EchoSession::default()) as Box<dyn SessionHandler>),
        bus.clone(),
        cache.clone(),
    ));
    gateway.start(&shutdown).await?;

    spawn_registry_watcher(
        registry as Arc<dyn ServiceRegistry>,
        ServiceIdentity {
            name: config.status.server_name.clone(),
            addr: "0.0.0.0".to_string(),
            port: config.listener.port,
        },
        Duration::from_secs(config.supervisor.registry_restart_secs.max(1)),
        &shutdown,
    );

    // Command deliveries from the bus feed the dispatcher.
    spawn_bus_consumer(
        "command-consumer",
        bus.clone() as Arc<dyn BusConsumer>,
        vec![format!("{}.cmd.#", config.status.server_name)],
        forward_to_queue(gateway.submitter()),
        Duration::from_secs(config.supervisor.consumer_restart_secs.max(1)),
        &shutdown,
    );

    if config.time_sync.mode != TimeSyncMode::Off {
        spawn_time_sync(
            bus.clone() as Arc<dyn BusConsumer>,
            config.time_sync.binding_key.clone(),
            config.time_sync.mode,
            Arc::new(SystemClockSync),
            Duration::from_secs(config.supervisor.consumer_restart_secs.max(1)),
            &shutdown,
        );
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received, shutting down");
    shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}
