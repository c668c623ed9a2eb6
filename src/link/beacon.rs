//! # GCS Heartbeat Beacon
//!
//! Outbound frame writer shared by the reader and the beacon thread, and the
//! thread that announces the gateway as a ground station once per second.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::Result;
use crate::mavlink::encoder::encode_frame;
use crate::mavlink::protocol::{Heartbeat, MavHeader, MavMessage, MavVersion};

use super::transport::LinkIo;

/// Period between GCS heartbeats
pub const BEACON_INTERVAL: Duration = Duration::from_secs(1);

/// Default source system id (conventional GCS id)
pub const GCS_SYSTEM_ID: u8 = 255;

/// Default source component id (MAV_COMP_ID_MISSIONPLANNER)
pub const GCS_COMPONENT_ID: u8 = 190;

/// Encodes and sends frames with a running sequence number
///
/// Clones share the transport and the sequence counter.
#[derive(Clone)]
pub struct FrameWriter {
    io: Arc<Mutex<Box<dyn LinkIo>>>,
    sequence: Arc<AtomicU8>,
    system_id: u8,
    component_id: u8,
    version: MavVersion,
}

impl FrameWriter {
    pub fn new(io: Box<dyn LinkIo>, system_id: u8, component_id: u8, version: MavVersion) -> Self {
        Self {
            io: Arc::new(Mutex::new(io)),
            sequence: Arc::new(AtomicU8::new(0)),
            system_id,
            component_id,
            version,
        }
    }

    /// Encode and send one message
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails or the transport rejects the write.
    pub fn send(&self, message: &MavMessage) -> Result<()> {
        let header = MavHeader {
            system_id: self.system_id,
            component_id: self.component_id,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        let frame = encode_frame(self.version, &header, message)?;

        let mut io = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        io.send(&frame)?;
        trace!("Sent {} ({} bytes)", message.name(), frame.len());
        Ok(())
    }
}

/// Running beacon thread; stops when [`Beacon::stop`] is called or on drop
pub struct Beacon {
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Beacon {
    /// Start sending GCS heartbeats every `interval`, the first immediately
    ///
    /// Send failures are logged at debug level and the beacon carries on.
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned.
    pub fn start(writer: FrameWriter, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("gcs-beacon".to_string())
            .spawn(move || {
                let heartbeat = MavMessage::Heartbeat(Heartbeat::gcs());
                loop {
                    if let Err(e) = writer.send(&heartbeat) {
                        debug!("GCS heartbeat not sent: {}", e);
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("GCS beacon stopped");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender wakes the thread
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Beacon {
    fn drop(&mut self) {
        self.shutdown();
    }
}
