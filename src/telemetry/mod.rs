//! # Telemetry Module
//!
//! Latest known vehicle state shared between the link reader and the
//! subscriber-serving side.
//!
//! This module handles:
//! - The snapshot record served to subscribers and the query endpoint
//! - Partial, per-field updates from decoded messages
//! - Consistent point-in-time reads under concurrent writes

pub mod snapshot;

pub use snapshot::{SnapshotStore, TelemetrySnapshot, TelemetryUpdate};
