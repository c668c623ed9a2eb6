//! Subscriber handles and the live subscriber registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::message::PushMessage;

/// Unique subscriber identifier
pub type SubscriberId = u64;

/// Outcome of one broadcast pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastReport {
    /// Handles the message was queued for
    pub delivered: usize,

    /// Handles removed because the send failed
    pub removed: usize,
}

/// Sending side of one subscriber connection
///
/// The connection task owns the matching receiver and writes queued text to
/// the socket. A send fails when that task is gone (receiver dropped) or when
/// the subscriber has fallen `capacity` messages behind.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    id: SubscriberId,
    tx: mpsc::Sender<Arc<str>>,
}

impl SubscriberHandle {
    /// Create a handle and the queue its connection task drains
    pub fn new(id: SubscriberId, capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id, tx }, rx)
    }

    /// Subscriber id
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Queue text without waiting
    ///
    /// # Returns
    ///
    /// * `bool` - false if the subscriber is gone or its queue is full
    pub fn try_send(&self, text: Arc<str>) -> bool {
        self.tx.try_send(text).is_ok()
    }
}

/// Live set of subscribers
///
/// Add, remove and broadcast may run concurrently from any thread. Broadcast
/// copies the handle set under the lock and sends outside it.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriberId, SubscriberHandle>>,
}

impl SubscriberRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a new subscriber
    pub fn next_id(&self) -> SubscriberId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Register a subscriber
    pub fn add(&self, handle: SubscriberHandle) {
        let id = handle.id();
        self.lock().insert(id, handle);
        info!("Subscriber {} registered", id);
    }

    /// Remove a subscriber
    ///
    /// # Returns
    ///
    /// * `bool` - false if it was already removed
    pub fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            info!("Subscriber {} removed", id);
        }
        removed
    }

    /// Whether a subscriber is currently registered
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nobody is subscribed
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Serialize once and queue for every registered subscriber
    ///
    /// Subscribers whose send fails are removed and receive nothing further.
    pub fn broadcast(&self, message: &PushMessage) -> BroadcastReport {
        let text: Arc<str> = match message.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                error!("Failed to serialize {} message: {}", message.kind(), e);
                return BroadcastReport::default();
            }
        };

        let handles: Vec<SubscriberHandle> = self.lock().values().cloned().collect();

        let mut report = BroadcastReport::default();
        for handle in handles {
            if handle.try_send(Arc::clone(&text)) {
                report.delivered += 1;
            } else {
                debug!("Send to subscriber {} failed, dropping it", handle.id());
                if self.remove(handle.id()) {
                    report.removed += 1;
                }
            }
        }

        report
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriberId, SubscriberHandle>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
