//! # MAV Telemetry Gateway
//!
//! Bridge live MAVLink vehicle telemetry to WebSocket subscribers.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration from the first argument or `MAV_GATEWAY_CONFIG`
//!    - Set up logging
//!    - Start the broadcast bridge consumer and the keepalive ticker
//!    - Start the vehicle link reader on its own thread
//!
//! 2. **Serving**
//!    - Accept subscribers until Ctrl+C
//!
//! 3. **Graceful Shutdown**
//!    - Stop the server, signal the reader, and wait for it to exit
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- config/gateway.toml
//! ```
//!
//! Expected output:
//! ```text
//! INFO mav_telemetry_gateway: MAV Telemetry Gateway v0.1.0 starting...
//! INFO mav_telemetry_gateway::link::reader: [MAV] Connecting to udpin:0.0.0.0:14550
//! INFO mav_telemetry_gateway::gateway::server: Serving subscribers on 0.0.0.0:8000
//! INFO mav_telemetry_gateway::link::reader: [MAV] Heartbeat OK
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

use mav_telemetry_gateway::config::{Config, CONFIG_ENV_VAR};
use mav_telemetry_gateway::gateway::keepalive::spawn_keepalive;
use mav_telemetry_gateway::gateway::{serve, BroadcastBridge, GatewayState, SubscriberRegistry};
use mav_telemetry_gateway::link::{LinkMonitor, LinkSettings, VehicleLink};
use mav_telemetry_gateway::logging;
use mav_telemetry_gateway::telemetry::SnapshotStore;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let path = Config::resolve_path(std::env::args().nth(1), std::env::var(CONFIG_ENV_VAR).ok());
    let config = Config::load_or_default(path.as_deref())
        .with_context(|| match &path {
            Some(path) => format!("loading {}", path.display()),
            None => "validating default configuration".to_string(),
        })?;

    let _log_guard = logging::init(&config.logging)?;

    info!("MAV Telemetry Gateway v{} starting...", env!("CARGO_PKG_VERSION"));
    match &path {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("Using built-in configuration"),
    }

    let store = Arc::new(SnapshotStore::new());
    let registry = Arc::new(SubscriberRegistry::new());
    let monitor = Arc::new(LinkMonitor::new());

    let (bridge, bridge_rx) = BroadcastBridge::channel();
    let broadcaster = tokio::spawn(bridge_rx.run(Arc::clone(&registry)));
    let keepalive = spawn_keepalive(
        bridge.clone(),
        Duration::from_secs(config.server.keepalive_secs),
    );

    let link = VehicleLink::new(
        config.endpoint()?,
        LinkSettings::from_config(&config)?,
        Arc::clone(&store),
        bridge,
        Arc::clone(&monitor),
    );
    let link_shutdown = link.shutdown_handle();
    let reader = link.spawn().context("starting vehicle link thread")?;

    let state = Arc::new(
        GatewayState::new(store, registry, monitor).with_limits(
            config.server.subscriber_buffer,
            Duration::from_millis(config.server.send_timeout_ms),
        ),
    );
    let bind = config.bind_addr()?;
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {}", bind))?;

    info!("Press Ctrl+C to exit");
    serve(listener, state, shutdown_signal()).await?;

    // Reader notices the flag within one receive timeout
    link_shutdown.store(true, Ordering::Release);
    keepalive.abort();
    let _ = keepalive.await;

    tokio::task::spawn_blocking(move || reader.join())
        .await?
        .map_err(|_| anyhow!("vehicle link thread panicked"))?;

    // Every bridge producer is gone now, so the consumer drains and exits
    broadcaster.await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down...");
}
