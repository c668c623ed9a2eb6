//! Shared view of the vehicle link's health.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Vehicle link connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl LinkStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
        }
    }
}

/// System and component the gateway addresses its requests to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkTarget {
    pub system: u8,
    pub component: u8,
}

impl LinkTarget {
    /// Build a target from heartbeat source ids; id 0 becomes 1
    pub fn normalized(system: u8, component: u8) -> Self {
        Self {
            system: if system == 0 { 1 } else { system },
            component: if component == 0 { 1 } else { component },
        }
    }
}

/// Link section of the health report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkHealth {
    pub state: LinkStatus,
    pub target_system: Option<u8>,
    pub target_component: Option<u8>,
    /// RFC 3339 time of the last vehicle heartbeat
    pub last_heartbeat: Option<String>,
    pub frames_received: u64,
    pub decode_errors: u64,
}

/// Link status, written by the reader thread and read by the server
#[derive(Debug)]
pub struct LinkMonitor {
    status: AtomicU8,
    target: Mutex<Option<LinkTarget>>,
    last_heartbeat: Mutex<Option<DateTime<Utc>>>,
    frames_received: AtomicU64,
    decode_errors: AtomicU64,
}

impl Default for LinkMonitor {
    fn default() -> Self {
        Self {
            status: AtomicU8::new(LinkStatus::Disconnected.as_u8()),
            target: Mutex::new(None),
            last_heartbeat: Mutex::new(None),
            frames_received: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
        }
    }
}

impl LinkMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: LinkStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }

    pub fn target(&self) -> Option<LinkTarget> {
        *self.target.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_target(&self, target: LinkTarget) {
        *self.target.lock().unwrap_or_else(PoisonError::into_inner) = Some(target);
    }

    /// Stamp a vehicle heartbeat with the current time
    pub fn record_heartbeat(&self) {
        *self
            .last_heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
    }

    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        *self
            .last_heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    /// Point-in-time health report
    pub fn health(&self) -> LinkHealth {
        let target = self.target();
        LinkHealth {
            state: self.status(),
            target_system: target.map(|t| t.system),
            target_component: target.map(|t| t.component),
            last_heartbeat: self
                .last_heartbeat()
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            frames_received: self.frames_received(),
            decode_errors: self.decode_errors(),
        }
    }
}
