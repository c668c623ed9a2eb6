//! Broadcast bridge from the link reader thread into the serving runtime.
//!
//! The reader calls [`BroadcastBridge::submit`] from its own OS thread; the
//! [`BridgeReceiver`] runs as a task on the runtime that owns subscriber
//! connections and executes each job in submission order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::message::PushMessage;
use super::registry::SubscriberRegistry;

/// Producer side, cheap to clone
#[derive(Debug, Clone)]
pub struct BroadcastBridge {
    tx: mpsc::UnboundedSender<PushMessage>,
}

/// Consumer side, owned by the serving runtime
#[derive(Debug)]
pub struct BridgeReceiver {
    rx: mpsc::UnboundedReceiver<PushMessage>,
}

impl BroadcastBridge {
    /// Create a connected bridge pair
    pub fn channel() -> (Self, BridgeReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, BridgeReceiver { rx })
    }

    /// Enqueue a broadcast without blocking
    ///
    /// Safe from any thread. After the receiver is gone the job is dropped.
    ///
    /// # Returns
    ///
    /// * `bool` - false if the job was dropped
    pub fn submit(&self, message: PushMessage) -> bool {
        match self.tx.send(message) {
            Ok(()) => true,
            Err(e) => {
                trace!("Bridge closed, dropping {} broadcast", e.0.kind());
                false
            }
        }
    }

    /// Whether the serving side has shut down
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl BridgeReceiver {
    /// Next queued job, `None` once every producer is dropped
    pub async fn recv(&mut self) -> Option<PushMessage> {
        self.rx.recv().await
    }

    /// Next queued job if one is ready
    pub fn try_recv(&mut self) -> Option<PushMessage> {
        self.rx.try_recv().ok()
    }

    /// Execute jobs against the registry until all producers are dropped
    pub async fn run(mut self, registry: Arc<SubscriberRegistry>) {
        while let Some(message) = self.rx.recv().await {
            let report = registry.broadcast(&message);
            trace!(
                "Broadcast {} to {} subscribers ({} removed)",
                message.kind(),
                report.delivered,
                report.removed
            );
        }
        debug!("Broadcast bridge closed");
    }
}
