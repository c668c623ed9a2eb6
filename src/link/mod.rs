//! # Vehicle Link
//!
//! Transports, liveness beacon, link status, and the reader thread that keeps
//! the telemetry snapshot current.

pub mod beacon;
pub mod monitor;
pub mod reader;
pub mod transport;

pub use monitor::{LinkHealth, LinkMonitor, LinkStatus, LinkTarget};
pub use reader::{LinkSettings, VehicleLink};
pub use transport::{Connector, Endpoint, LinkIo};
