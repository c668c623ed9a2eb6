//! HTTP and WebSocket surface for subscribers.
//!
//! - `GET /api/telemetry` returns the current snapshot
//! - `GET /ws/telemetry` upgrades to a push subscription
//! - `GET /health` reports subscriber count and link status

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use super::message::PushMessage;
use super::registry::{SubscriberHandle, SubscriberId, SubscriberRegistry};
use crate::error::Result;
use crate::link::{LinkHealth, LinkMonitor};
use crate::telemetry::{SnapshotStore, TelemetrySnapshot};

/// Default per-subscriber queue length
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Default bound on a single WebSocket send
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state
pub struct GatewayState {
    pub store: Arc<SnapshotStore>,
    pub registry: Arc<SubscriberRegistry>,
    pub monitor: Arc<LinkMonitor>,
    pub subscriber_buffer: usize,
    pub send_timeout: Duration,
}

impl GatewayState {
    pub fn new(
        store: Arc<SnapshotStore>,
        registry: Arc<SubscriberRegistry>,
        monitor: Arc<LinkMonitor>,
    ) -> Self {
        Self {
            store,
            registry,
            monitor,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Override queue length and send timeout
    pub fn with_limits(mut self, subscriber_buffer: usize, send_timeout: Duration) -> Self {
        self.subscriber_buffer = subscriber_buffer;
        self.send_timeout = send_timeout;
        self
    }

    /// Register a new subscriber with the current snapshot already queued
    ///
    /// The snapshot is queued before the handle joins the registry, so it is
    /// always the first message the subscriber sees.
    ///
    /// # Errors
    ///
    /// Returns error if the snapshot cannot be serialized.
    pub fn open_subscriber(&self) -> Result<(SubscriberId, mpsc::Receiver<Arc<str>>)> {
        let (handle, rx) = SubscriberHandle::new(self.registry.next_id(), self.subscriber_buffer);
        let initial: Arc<str> = PushMessage::Telemetry(self.store.read()).to_json()?.into();
        handle.try_send(initial);

        let id = handle.id();
        self.registry.add(handle);
        Ok((id, rx))
    }
}

/// Body of `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub subscribers: usize,
    pub link: LinkHealth,
}

/// Create the subscriber router
pub fn create_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/api/telemetry", get(telemetry_handler))
        .route("/ws/telemetry", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Serve subscribers until `shutdown` resolves
///
/// # Errors
///
/// Returns error if the listener fails.
pub async fn serve<F>(listener: TcpListener, state: Arc<GatewayState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Serving subscribers on {}", listener.local_addr()?);
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn telemetry_handler(State(state): State<Arc<GatewayState>>) -> Json<TelemetrySnapshot> {
    Json(state.store.read())
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        subscribers: state.registry.len(),
        link: state.monitor.health(),
    })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Pump queued messages to one subscriber until either side goes away
async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>) {
    let (id, mut queue) = match state.open_subscriber() {
        Ok(opened) => opened,
        Err(e) => {
            error!("Failed to open subscriber: {}", e);
            return;
        }
    };
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            outbound = queue.recv() => {
                let Some(text) = outbound else {
                    debug!("Subscriber {} dropped by registry", id);
                    break;
                };
                match timeout(state.send_timeout, ws_tx.send(Message::Text(text.to_string()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!("Send to subscriber {} failed: {}", id, e);
                        break;
                    }
                    Err(_) => {
                        warn!("Send to subscriber {} timed out", id);
                        break;
                    }
                }
            }

            inbound = ws_rx.next() => {
                match inbound {
                    // Client pings and other chatter carry no requests
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Subscriber {} read error: {}", id, e);
                        break;
                    }
                }
            }
        }
    }

    state.registry.remove(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkStatus;
    use crate::telemetry::TelemetryUpdate;

    fn state() -> GatewayState {
        GatewayState::new(
            Arc::new(SnapshotStore::new()),
            Arc::new(SubscriberRegistry::new()),
            Arc::new(LinkMonitor::new()),
        )
    }

    #[test]
    fn test_open_subscriber_queues_snapshot_first() {
        let state = state();
        state.store.update(TelemetryUpdate {
            altitude: Some(12.0),
            ..Default::default()
        });

        let (id, mut rx) = state.open_subscriber().unwrap();
        assert!(state.registry.contains(id));

        state.registry.broadcast(&PushMessage::Ping);

        let first: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(first["type"], "telemetry");
        assert_eq!(first["data"]["altitude"], 12.0);
        assert_eq!(&*rx.try_recv().unwrap(), r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_limits_apply_to_new_subscribers() {
        let state = state().with_limits(1, Duration::from_millis(10));
        assert_eq!(state.send_timeout, Duration::from_millis(10));

        // Queue of one is already holding the initial snapshot
        let (id, _rx) = state.open_subscriber().unwrap();
        let report = state.registry.broadcast(&PushMessage::Ping);
        assert_eq!(report.removed, 1);
        assert!(!state.registry.contains(id));
    }

    #[tokio::test]
    async fn test_health_handler_reports_link() {
        let state = Arc::new(state());
        state.monitor.set_status(LinkStatus::Connected);
        let (_id, _rx) = state.open_subscriber().unwrap();

        let Json(report) = health_handler(State(Arc::clone(&state))).await;
        assert_eq!(report.status, "ok");
        assert_eq!(report.subscribers, 1);
        assert_eq!(report.link.state, LinkStatus::Connected);
    }

    #[tokio::test]
    async fn test_telemetry_handler_returns_snapshot() {
        let state = Arc::new(state());
        let Json(snapshot) = telemetry_handler(State(state)).await;
        assert_eq!(snapshot, TelemetrySnapshot::default());
    }
}
