//! # MAVLink Protocol Module
//!
//! Minimal MAVLink implementation covering the messages the gateway touches.
//!
//! This module handles:
//! - v1 and v2 frame encoding for outbound HEARTBEAT and REQUEST_DATA_STREAM
//! - Frame synchronization over byte streams and datagrams
//! - HEARTBEAT and VFR_HUD decoding with per-field validity
//! - CRC-16/MCRF4XX (X.25) checksums seeded with CRC_EXTRA
//! - Flight-mode naming for ArduPilot and PX4 autopilots

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;
pub mod modes;
