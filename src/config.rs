//! # Configuration Module
//!
//! Handles loading and validating gateway configuration from TOML files.
//! Every section and key is optional; missing values take the defaults below.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{GatewayError, Result};
use crate::link::transport::{Endpoint, DEFAULT_ENDPOINT};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "MAV_GATEWAY_CONFIG";

/// Highest stream rate the gateway will request
const MAX_STREAM_RATE_HZ: u16 = 50;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub link: LinkConfig,
    pub streams: StreamConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Vehicle link configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LinkConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,

    #[serde(default = "default_beacon_interval_ms")]
    pub beacon_interval_ms: u64,

    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// 0 disables stall detection
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,

    #[serde(default = "default_reconnect")]
    pub reconnect: bool,

    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    #[serde(default = "default_source_system")]
    pub source_system: u8,

    #[serde(default = "default_source_component")]
    pub source_component: u8,

    #[serde(default = "default_mavlink_version")]
    pub mavlink_version: u8,
}

/// Telemetry stream rates requested from the autopilot, in Hz
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StreamConfig {
    #[serde(default = "default_all_hz")]
    pub all_hz: u16,

    #[serde(default = "default_extra1_hz")]
    pub extra1_hz: u16,

    #[serde(default = "default_extended_status_hz")]
    pub extended_status_hz: u16,
}

/// Subscriber-facing server configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Empty disables file output
    #[serde(default)]
    pub directory: String,
}

// Default value functions
fn default_endpoint() -> String { DEFAULT_ENDPOINT.to_string() }
fn default_connect_timeout_secs() -> u64 { 30 }
fn default_recv_timeout_ms() -> u64 { 1000 }
fn default_beacon_interval_ms() -> u64 { 1000 }
fn default_error_backoff_ms() -> u64 { 100 }
fn default_stall_timeout_secs() -> u64 { 60 }
fn default_reconnect() -> bool { true }
fn default_reconnect_initial_ms() -> u64 { 1000 }
fn default_reconnect_max_ms() -> u64 { 30000 }
fn default_source_system() -> u8 { 255 }
fn default_source_component() -> u8 { 190 }
fn default_mavlink_version() -> u8 { 2 }

fn default_all_hz() -> u16 { 4 }
fn default_extra1_hz() -> u16 { 10 }
fn default_extended_status_hz() -> u16 { 2 }

fn default_bind() -> String { "0.0.0.0:8000".to_string() }
fn default_keepalive_secs() -> u64 { 20 }
fn default_subscriber_buffer() -> usize { 64 }
fn default_send_timeout_ms() -> u64 { 5000 }

fn default_log_level() -> String { "info".to_string() }

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_secs: default_connect_timeout_secs(),
            recv_timeout_ms: default_recv_timeout_ms(),
            beacon_interval_ms: default_beacon_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            stall_timeout_secs: default_stall_timeout_secs(),
            reconnect: default_reconnect(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            source_system: default_source_system(),
            source_component: default_source_component(),
            mavlink_version: default_mavlink_version(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            all_hz: default_all_hz(),
            extra1_hz: default_extra1_hz(),
            extended_status_hz: default_extended_status_hz(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            keepalive_secs: default_keepalive_secs(),
            subscriber_buffer: default_subscriber_buffer(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> GatewayError {
    GatewayError::Config(toml::de::Error::custom(message))
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(format!("{} must be between {} and {}", name, min, max)));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mav_telemetry_gateway::config::Config;
    ///
    /// let config = Config::load("config/gateway.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Pick the configuration file from a CLI argument or the environment
    ///
    /// The argument wins over [`CONFIG_ENV_VAR`]. `None` means built-in defaults.
    pub fn resolve_path(arg: Option<String>, env: Option<String>) -> Option<PathBuf> {
        arg.or(env)
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
    }

    /// Load from `path`, or validated defaults when no path is given
    ///
    /// # Errors
    ///
    /// Same as [`Config::load`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Parsed link endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint string is malformed.
    pub fn endpoint(&self) -> Result<Endpoint> {
        self.link.endpoint.parse()
    }

    /// Parsed server bind address
    ///
    /// # Errors
    ///
    /// Returns error if the bind string is not `IP:PORT`.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .map_err(|_| invalid(format!("bind '{}' must be IP:PORT", self.server.bind)))
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        let link = &self.link;

        if link.endpoint.trim().is_empty() {
            return Err(invalid("link endpoint cannot be empty"));
        }
        self.endpoint()
            .map_err(|e| invalid(format!("link endpoint: {}", e)))?;

        check_range("connect_timeout_secs", link.connect_timeout_secs, 1, 3600)?;
        check_range("recv_timeout_ms", link.recv_timeout_ms, 1, 60000)?;
        check_range("beacon_interval_ms", link.beacon_interval_ms, 1, 60000)?;
        check_range("error_backoff_ms", link.error_backoff_ms, 1, 60000)?;
        check_range("stall_timeout_secs", link.stall_timeout_secs, 0, 3600)?;
        check_range("reconnect_initial_ms", link.reconnect_initial_ms, 1, 600000)?;
        check_range("reconnect_max_ms", link.reconnect_max_ms, 1, 600000)?;

        if link.reconnect_initial_ms > link.reconnect_max_ms {
            return Err(invalid("reconnect_initial_ms must not exceed reconnect_max_ms"));
        }

        if link.source_system == 0 {
            return Err(invalid("source_system must be between 1 and 255"));
        }

        if ![1, 2].contains(&link.mavlink_version) {
            return Err(invalid("mavlink_version must be 1 or 2"));
        }

        for (name, rate) in [
            ("all_hz", self.streams.all_hz),
            ("extra1_hz", self.streams.extra1_hz),
            ("extended_status_hz", self.streams.extended_status_hz),
        ] {
            if rate > MAX_STREAM_RATE_HZ {
                return Err(invalid(format!(
                    "{} must be at most {} Hz",
                    name, MAX_STREAM_RATE_HZ
                )));
            }
        }

        self.bind_addr()?;
        check_range("keepalive_secs", self.server.keepalive_secs, 1, 3600)?;
        check_range("send_timeout_ms", self.server.send_timeout_ms, 1, 60000)?;

        if self.server.subscriber_buffer == 0 {
            return Err(invalid("subscriber_buffer must be greater than 0"));
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
            return Err(invalid(
                "log level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }
}
