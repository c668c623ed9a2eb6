//! # Logging
//!
//! Console logging through `tracing-subscriber`, with an optional daily
//! rolling log file written by a non-blocking background worker.

use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{GatewayError, Result};

/// Log file name prefix; the appender adds the date
pub const LOG_FILE_PREFIX: &str = "mav-gateway.log";

/// Filter from `RUST_LOG` if set, else the configured level
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_ascii_lowercase()))
}

/// Daily rolling file writer under `directory`
///
/// # Errors
///
/// Returns error if the directory cannot be created.
fn file_writer(directory: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(directory)?;
    let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber
///
/// # Returns
///
/// * `Option<WorkerGuard>` - Present when file logging is on; hold it for the
///   life of the process or buffered lines are lost
///
/// # Errors
///
/// Returns error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = if config.directory.trim().is_empty() {
        (None, None)
    } else {
        let (writer, guard) = file_writer(Path::new(&config.directory))?;
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_thread_names(true);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(build_filter(&config.level))
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init()
        .map_err(|e| GatewayError::Logging(e.to_string()))?;

    Ok(guard)
}
