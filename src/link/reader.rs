//! # Vehicle Link Reader
//!
//! Owns the vehicle link on a dedicated OS thread and drives it through
//! Disconnected → Connecting → Connected.
//!
//! While connecting it waits for the first vehicle heartbeat and adopts that
//! system as its target. Once connected it starts the GCS beacon, asks the
//! autopilot for telemetry streams, and then folds every VFR_HUD and vehicle
//! HEARTBEAT into the snapshot store, submitting a broadcast of the full
//! snapshot after each one. A detected disconnect or stall drops back to
//! Disconnected and, when enabled, reconnects with exponential backoff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::gateway::bridge::BroadcastBridge;
use crate::gateway::message::PushMessage;
use crate::mavlink::decoder::FrameParser;
use crate::mavlink::modes::mode_name;
use crate::mavlink::protocol::{
    Heartbeat, MavFrame, MavHeader, MavMessage, MavVersion, RequestDataStream, VfrHud,
    MAV_DATA_STREAM_ALL, MAV_DATA_STREAM_EXTENDED_STATUS, MAV_DATA_STREAM_EXTRA1,
};
use crate::telemetry::{SnapshotStore, TelemetryUpdate};

use super::beacon::{Beacon, FrameWriter, BEACON_INTERVAL, GCS_COMPONENT_ID, GCS_SYSTEM_ID};
use super::monitor::{LinkMonitor, LinkStatus, LinkTarget};
use super::transport::{is_disconnect, Connector, LinkIo};

/// Receive buffer size, enough for any UDP datagram a router forwards
const RECV_BUFFER_SIZE: usize = 2048;

/// Timing, identity and stream settings for the reader
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSettings {
    pub connect_timeout: Duration,
    pub recv_timeout: Duration,
    pub beacon_interval: Duration,
    /// Pause after a transient receive error
    pub error_backoff: Duration,
    /// `None` disables stall detection
    pub stall_timeout: Option<Duration>,
    pub reconnect: bool,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    pub source_system: u8,
    pub source_component: u8,
    pub version: MavVersion,
    /// `(stream id, rate in Hz)` pairs requested after connecting
    pub streams: Vec<(u8, u16)>,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            recv_timeout: Duration::from_secs(1),
            beacon_interval: BEACON_INTERVAL,
            error_backoff: Duration::from_millis(100),
            stall_timeout: Some(Duration::from_secs(60)),
            reconnect: true,
            reconnect_initial: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
            source_system: GCS_SYSTEM_ID,
            source_component: GCS_COMPONENT_ID,
            version: MavVersion::V2,
            streams: vec![
                (MAV_DATA_STREAM_ALL, 4),
                (MAV_DATA_STREAM_EXTRA1, 10),
                (MAV_DATA_STREAM_EXTENDED_STATUS, 2),
            ],
        }
    }
}

impl LinkSettings {
    /// Derive reader settings from validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if the configured MAVLink version is not 1 or 2.
    pub fn from_config(config: &Config) -> Result<Self> {
        let link = &config.link;
        let streams = &config.streams;

        Ok(Self {
            connect_timeout: Duration::from_secs(link.connect_timeout_secs),
            recv_timeout: Duration::from_millis(link.recv_timeout_ms),
            beacon_interval: Duration::from_millis(link.beacon_interval_ms),
            error_backoff: Duration::from_millis(link.error_backoff_ms),
            stall_timeout: match link.stall_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            reconnect: link.reconnect,
            reconnect_initial: Duration::from_millis(link.reconnect_initial_ms),
            reconnect_max: Duration::from_millis(link.reconnect_max_ms),
            source_system: link.source_system,
            source_component: link.source_component,
            version: MavVersion::from_number(link.mavlink_version)?,
            streams: vec![
                (MAV_DATA_STREAM_ALL, streams.all_hz),
                (MAV_DATA_STREAM_EXTRA1, streams.extra1_hz),
                (MAV_DATA_STREAM_EXTENDED_STATUS, streams.extended_status_hz),
            ],
        })
    }
}

/// How a connected session ended
#[derive(Debug)]
enum SessionEnd {
    Disconnected(String),
    Shutdown,
}

/// An established link
struct Session {
    io: Box<dyn LinkIo>,
    parser: FrameParser,
    writer: FrameWriter,
    target: LinkTarget,
    /// Raw system id the vehicle heartbeats carry, before normalization
    vehicle_system: u8,
    first_heartbeat: Heartbeat,
}

/// Vehicle link state machine
pub struct VehicleLink<C: Connector> {
    connector: C,
    settings: LinkSettings,
    store: Arc<SnapshotStore>,
    bridge: BroadcastBridge,
    monitor: Arc<LinkMonitor>,
    shutdown: Arc<AtomicBool>,
}

impl<C: Connector> VehicleLink<C> {
    pub fn new(
        connector: C,
        settings: LinkSettings,
        store: Arc<SnapshotStore>,
        bridge: BroadcastBridge,
        monitor: Arc<LinkMonitor>,
    ) -> Self {
        Self {
            connector,
            settings,
            store,
            bridge,
            monitor,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops the reader within one receive timeout once set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the reader on its own thread
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>>
    where
        C: 'static,
    {
        thread::Builder::new()
            .name("vehicle-link".to_string())
            .spawn(move || self.run())
    }

    /// Connect, read, and reconnect until shut down or reconnection is disabled
    pub fn run(&self) {
        let mut backoff = self.settings.reconnect_initial;

        while !self.is_shutdown() {
            match self.connect() {
                Ok(session) => {
                    backoff = self.settings.reconnect_initial;
                    match self.run_session(session) {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Disconnected(reason) => {
                            warn!("[MAV] Link lost: {}", reason);
                        }
                    }
                }
                Err(GatewayError::LinkClosed) if self.is_shutdown() => break,
                Err(e) => error!("[MAV] Connection failed: {}", e),
            }

            self.monitor.set_status(LinkStatus::Disconnected);

            if !self.settings.reconnect {
                info!("[MAV] Reconnect disabled, reader exiting");
                break;
            }

            info!("[MAV] Reconnecting in {:?}", backoff);
            if self.sleep_unless_shutdown(backoff) {
                break;
            }
            backoff = (backoff * 2).min(self.settings.reconnect_max);
        }

        self.monitor.set_status(LinkStatus::Disconnected);
        info!("[MAV] Reader stopped");
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Sleep in short slices; true if shutdown was requested meanwhile
    fn sleep_unless_shutdown(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_shutdown() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            thread::sleep(remaining.min(Duration::from_millis(50)));
        }
    }

    fn connect(&self) -> Result<Session> {
        self.monitor.set_status(LinkStatus::Connecting);
        info!("[MAV] Connecting to {}", self.connector.describe());

        let mut io = self.connector.connect(self.settings.connect_timeout)?;
        let mut parser = FrameParser::new();
        let (header, heartbeat) = self.wait_heartbeat(io.as_mut(), &mut parser)?;
        info!("[MAV] Heartbeat OK");

        let target = LinkTarget::normalized(header.system_id, header.component_id);
        info!(
            "[MAV] Target sys={} comp={} (heartbeat from sys={} comp={})",
            target.system, target.component, header.system_id, header.component_id
        );
        self.monitor.set_target(target);
        self.monitor.record_heartbeat();

        let writer = FrameWriter::new(
            io.try_clone()?,
            self.settings.source_system,
            self.settings.source_component,
            self.settings.version,
        );

        Ok(Session {
            io,
            parser,
            writer,
            target,
            vehicle_system: header.system_id,
            first_heartbeat: heartbeat,
        })
    }

    /// Block until a vehicle heartbeat arrives or the connect timeout passes
    fn wait_heartbeat(
        &self,
        io: &mut dyn LinkIo,
        parser: &mut FrameParser,
    ) -> Result<(MavHeader, Heartbeat)> {
        let deadline = Instant::now() + self.settings.connect_timeout;
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        loop {
            if self.is_shutdown() {
                return Err(GatewayError::LinkClosed);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(GatewayError::ConnectTimeout(self.settings.connect_timeout));
            }

            match io.recv(&mut buf, remaining.min(self.settings.recv_timeout)) {
                Ok(Some(n)) => {
                    parser.push(&buf[..n]);
                    while let Some(result) = parser.next_frame() {
                        match result {
                            Ok(MavFrame {
                                header,
                                message: MavMessage::Heartbeat(hb),
                                ..
                            }) if hb.is_vehicle(header.component_id) => {
                                self.monitor.record_frame();
                                return Ok((header, hb));
                            }
                            Ok(frame) => {
                                self.monitor.record_frame();
                                trace!("[MAV] Ignoring {} while connecting", frame.message.name());
                            }
                            Err(e) => self.record_skipped(&e),
                        }
                    }
                }
                Ok(None) => {}
                Err(e) if is_disconnect(&e) => return Err(e.into()),
                Err(e) => {
                    warn!("[MAV] Receive error while connecting: {}", e);
                    thread::sleep(self.settings.error_backoff);
                }
            }
        }
    }

    fn run_session(&self, mut session: Session) -> SessionEnd {
        self.monitor.set_status(LinkStatus::Connected);
        self.apply_heartbeat(&session.first_heartbeat);

        let _beacon = match Beacon::start(session.writer.clone(), self.settings.beacon_interval) {
            Ok(beacon) => Some(beacon),
            Err(e) => {
                error!("[MAV] Failed to start GCS beacon: {}", e);
                None
            }
        };

        self.request_streams(&session.writer, session.target);

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let mut last_frame = Instant::now();

        loop {
            if self.is_shutdown() {
                return SessionEnd::Shutdown;
            }
            if let Some(stall) = self.settings.stall_timeout {
                if last_frame.elapsed() >= stall {
                    return SessionEnd::Disconnected(format!("no data for {:?}", stall));
                }
            }

            match session.io.recv(&mut buf, self.settings.recv_timeout) {
                Ok(Some(n)) => {
                    session.parser.push(&buf[..n]);
                    while let Some(result) = session.parser.next_frame() {
                        match result {
                            Ok(frame) => {
                                last_frame = Instant::now();
                                self.monitor.record_frame();
                                self.handle_frame(&frame, session.vehicle_system);
                            }
                            Err(e) => {
                                if matches!(e, GatewayError::UnknownMessage(_)) {
                                    last_frame = Instant::now();
                                }
                                self.record_skipped(&e);
                            }
                        }
                    }
                }
                Ok(None) => trace!("[MAV] Receive timed out"),
                Err(e) if is_disconnect(&e) => return SessionEnd::Disconnected(e.to_string()),
                Err(e) => {
                    error!("[MAV] Receive error: {}", e);
                    thread::sleep(self.settings.error_backoff);
                }
            }
        }
    }

    fn record_skipped(&self, error: &GatewayError) {
        match error {
            GatewayError::UnknownMessage(id) => {
                self.monitor.record_frame();
                trace!("[MAV] Skipping message id {}", id);
            }
            other => {
                self.monitor.record_decode_error();
                debug!("[MAV] Dropped bytes: {}", other);
            }
        }
    }

    fn request_streams(&self, writer: &FrameWriter, target: LinkTarget) {
        for &(stream_id, rate) in &self.settings.streams {
            let request = MavMessage::RequestDataStream(RequestDataStream {
                req_message_rate: rate,
                target_system: target.system,
                target_component: target.component,
                req_stream_id: stream_id,
                start_stop: u8::from(rate > 0),
            });
            match writer.send(&request) {
                Ok(()) => debug!("[MAV] Requested stream {} at {} Hz", stream_id, rate),
                Err(e) => error!("[MAV] Stream request {} failed: {}", stream_id, e),
            }
        }
        info!("[MAV] Requested telemetry streams");
    }

    /// Fold a frame into the store; true if a broadcast was submitted
    fn handle_frame(&self, frame: &MavFrame, vehicle_system: u8) -> bool {
        match &frame.message {
            MavMessage::VfrHud(hud) => {
                trace!("[MAV RAW] {:?}", hud);
                self.store.update(hud_update(hud));
            }
            MavMessage::Heartbeat(hb)
                if frame.header.system_id == vehicle_system
                    && hb.is_vehicle(frame.header.component_id) =>
            {
                trace!("[MAV RAW] {:?}", hb);
                self.monitor.record_heartbeat();
                self.store.update(heartbeat_update(hb));
            }
            other => {
                trace!("[MAV] Ignoring {} from sys={}", other.name(), frame.header.system_id);
                return false;
            }
        }

        self.bridge.submit(PushMessage::Telemetry(self.store.read()))
    }

    fn apply_heartbeat(&self, heartbeat: &Heartbeat) {
        self.store.update(heartbeat_update(heartbeat));
        self.bridge.submit(PushMessage::Telemetry(self.store.read()));
    }
}

fn hud_update(hud: &VfrHud) -> TelemetryUpdate {
    TelemetryUpdate {
        altitude: hud.alt.map(f64::from),
        ground_speed: hud.groundspeed.map(f64::from),
        heading: hud.heading.map(f64::from),
        ..Default::default()
    }
}

fn heartbeat_update(heartbeat: &Heartbeat) -> TelemetryUpdate {
    TelemetryUpdate {
        mode: mode_name(heartbeat),
        armed: heartbeat.armed(),
        ..Default::default()
    }
}
