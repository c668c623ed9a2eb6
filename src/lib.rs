//! # MAV Telemetry Gateway Library
//!
//! Bridge live MAVLink vehicle telemetry to WebSocket subscribers.
//!
//! A reader thread keeps a link to the vehicle, folds VFR_HUD and HEARTBEAT
//! messages into a telemetry snapshot, and pushes the full snapshot to every
//! subscriber after each update. Subscribers connect over WebSocket or poll
//! the snapshot over HTTP.

pub mod config;
pub mod error;
pub mod gateway;
pub mod link;
pub mod logging;
pub mod mavlink;
pub mod telemetry;
