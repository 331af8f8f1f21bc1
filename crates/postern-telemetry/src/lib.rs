//! Logging infrastructure for the Postern compiler and runtime.
//!
//! Structured logging through `tracing-subscriber`, JSON for machines and
//! pretty output for people, plus the standard event names the compiler
//! and runtime log under.
//!
//! # Usage
//!
//! ```ignore
//! use postern_telemetry::{LogFormat, TelemetryConfig};
//!
//! let config = TelemetryConfig::new()
//!     .with_log_level("debug")
//!     .with_log_format(LogFormat::Pretty);
//! postern_telemetry::init(&config)?;
//! ```

pub mod config;
pub mod logging;

pub use config::{LogFormat, TelemetryConfig};
pub use logging::{events, init_logging};

use thiserror::Error;

/// Telemetry errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),

    /// The configured log format is not known.
    #[error("unknown log format '{0}' (expected json or pretty)")]
    UnknownFormat(String),
}

/// Initialize logging for the current process.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    logging::init_logging(config)
}
