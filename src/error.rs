//! # Error Types
//!
//! Custom error types for the telemetry gateway using `thiserror`.

use std::time::Duration;
use thiserror::Error;

/// Main error type for the telemetry gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// MAVLink framing errors (truncated frame, bad length, bad start byte)
    #[error("MAVLink protocol error: {0}")]
    Protocol(String),

    /// Frame checksum did not match
    #[error("MAVLink CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    /// Message id the gateway has no definition for
    #[error("Unknown MAVLink message id {0}")]
    UnknownMessage(u32),

    /// Link endpoint string could not be parsed
    #[error("Invalid link endpoint: {0}")]
    InvalidEndpoint(String),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// No vehicle heartbeat arrived while connecting
    #[error("No vehicle heartbeat within {0:?}")]
    ConnectTimeout(Duration),

    /// The link was closed by the remote end or shut down locally
    #[error("Vehicle link closed")]
    LinkClosed,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Logging could not be initialized
    #[error("Logging error: {0}")]
    Logging(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the telemetry gateway
pub type Result<T> = std::result::Result<T, GatewayError>;
