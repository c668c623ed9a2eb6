//! # Telemetry Snapshot Store

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

/// Mode reported before any vehicle heartbeat has been seen
pub const UNKNOWN_MODE: &str = "UNKNOWN";

/// Latest known vehicle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Altitude in meters
    pub altitude: f64,

    /// Ground speed in m/s
    pub ground_speed: f64,

    /// Heading in degrees
    pub heading: f64,

    /// Flight mode name
    pub mode: String,

    /// Motors armed
    pub armed: bool,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            altitude: 0.0,
            ground_speed: 0.0,
            heading: 0.0,
            mode: UNKNOWN_MODE.to_string(),
            armed: false,
        }
    }
}

/// A partial update; `None` fields leave the stored value untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryUpdate {
    pub altitude: Option<f64>,
    pub ground_speed: Option<f64>,
    pub heading: Option<f64>,
    pub mode: Option<String>,
    pub armed: Option<bool>,
}

impl TelemetryUpdate {
    /// True when the update carries no fields
    pub fn is_empty(&self) -> bool {
        self.altitude.is_none()
            && self.ground_speed.is_none()
            && self.heading.is_none()
            && self.mode.is_none()
            && self.armed.is_none()
    }

    fn apply_to(self, snapshot: &mut TelemetrySnapshot) {
        if let Some(altitude) = self.altitude {
            snapshot.altitude = altitude;
        }
        if let Some(ground_speed) = self.ground_speed {
            snapshot.ground_speed = ground_speed;
        }
        if let Some(heading) = self.heading {
            snapshot.heading = heading;
        }
        if let Some(mode) = self.mode {
            snapshot.mode = mode;
        }
        if let Some(armed) = self.armed {
            snapshot.armed = armed;
        }
    }
}

/// Lock-guarded snapshot shared by the link reader and the server
///
/// Only the vehicle link reader writes; readers always get a full copy taken
/// under the lock, so an update is never observed half-applied.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    inner: RwLock<TelemetrySnapshot>,
}

impl SnapshotStore {
    /// Create a store holding the default snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a partial update atomically
    ///
    /// # Returns
    ///
    /// * `bool` - false if the update was empty and nothing changed
    pub fn update(&self, update: TelemetryUpdate) -> bool {
        if update.is_empty() {
            return false;
        }

        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        update.apply_to(&mut guard);
        true
    }

    /// Point-in-time copy of the full snapshot
    pub fn read(&self) -> TelemetrySnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_default_snapshot() {
        let store = SnapshotStore::new();
        let snap = store.read();
        assert_eq!(snap.altitude, 0.0);
        assert_eq!(snap.ground_speed, 0.0);
        assert_eq!(snap.heading, 0.0);
        assert_eq!(snap.mode, "UNKNOWN");
        assert!(!snap.armed);
    }

    #[test]
    fn test_partial_update_leaves_other_fields() {
        let store = SnapshotStore::new();
        store.update(TelemetryUpdate {
            mode: Some("LOITER".to_string()),
            armed: Some(true),
            ..Default::default()
        });
        store.update(TelemetryUpdate {
            altitude: Some(120.5),
            ground_speed: Some(15.2),
            heading: Some(270.0),
            ..Default::default()
        });

        let snap = store.read();
        assert_eq!(snap.altitude, 120.5);
        assert_eq!(snap.ground_speed, 15.2);
        assert_eq!(snap.heading, 270.0);
        assert_eq!(snap.mode, "LOITER");
        assert!(snap.armed);
    }

    #[test]
    fn test_empty_update_is_noop() {
        let store = SnapshotStore::new();
        assert!(!store.update(TelemetryUpdate::default()));
        assert_eq!(store.read(), TelemetrySnapshot::default());
    }

    #[test]
    fn test_last_write_wins_per_field() {
        let store = SnapshotStore::new();
        for alt in [1.0, 2.0, 3.0] {
            store.update(TelemetryUpdate {
                altitude: Some(alt),
                ..Default::default()
            });
        }
        store.update(TelemetryUpdate {
            heading: Some(90.0),
            ..Default::default()
        });

        let snap = store.read();
        assert_eq!(snap.altitude, 3.0);
        assert_eq!(snap.heading, 90.0);
    }

    #[test]
    fn test_concurrent_reads_never_tear() {
        // Writer keeps altitude == heading; any read with them unequal is torn
        let store = Arc::new(SnapshotStore::new());
        let writer_store = Arc::clone(&store);

        let writer = thread::spawn(move || {
            for i in 0..5_000 {
                let value = i as f64;
                writer_store.update(TelemetryUpdate {
                    altitude: Some(value),
                    heading: Some(value),
                    ..Default::default()
                });
            }
        });

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..5_000 {
                        let snap = store.read();
                        assert_eq!(snap.altitude, snap.heading);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }

        assert_eq!(store.read().altitude, 4_999.0);
    }

    #[test]
    fn test_snapshot_json_keys() {
        let json = serde_json::to_value(TelemetrySnapshot::default()).unwrap();
        let obj = json.as_object().unwrap();
        for key in ["altitude", "ground_speed", "heading", "mode", "armed"] {
            assert!(obj.contains_key(key), "missing key {}", key);
        }
        assert_eq!(obj.len(), 5);
    }
}
