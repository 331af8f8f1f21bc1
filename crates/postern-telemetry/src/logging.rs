//! Structured logging.
//!
//! Logs go to stderr so that command output on stdout stays parseable.

use crate::{LogFormat, TelemetryConfig, TelemetryError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the logging subsystem.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let result = match config.log_format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_current_span(true)
                .with_span_list(false)
                .flatten_event(true)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init()
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init()
        }
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    tracing::debug!(service = %config.service_name, "logging initialized");
    Ok(())
}

/// Standard log event names.
pub mod events {
    /// A compilation run started.
    pub const COMPILE_STARTED: &str = "compile_started";

    /// One controller file was analyzed.
    pub const CONTROLLER_ANALYZED: &str = "controller_analyzed";

    /// An artifact was written.
    pub const ARTIFACT_EMITTED: &str = "artifact_emitted";

    /// Error diagnostics prevented emission.
    pub const EMISSION_BLOCKED: &str = "emission_blocked";

    /// A resolver answered the request; later steps were skipped.
    pub const DISPATCH_SHORT_CIRCUIT: &str = "dispatch_short_circuit";

    /// Extraction, a resolver, the handler or an offloaded task failed.
    pub const DISPATCH_ERROR: &str = "dispatch_error";
}

/// Helper macros for structured logging with standard fields.
///
/// These wrap the tracing macros to keep the `event` field consistent.
#[macro_export]
macro_rules! log_compile_started {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::COMPILE_STARTED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_controller_analyzed {
    ($($field:tt)*) => {
        tracing::debug!(
            event = $crate::logging::events::CONTROLLER_ANALYZED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_artifact_emitted {
    ($($field:tt)*) => {
        tracing::info!(
            event = $crate::logging::events::ARTIFACT_EMITTED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_emission_blocked {
    ($($field:tt)*) => {
        tracing::warn!(
            event = $crate::logging::events::EMISSION_BLOCKED,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_dispatch_short_circuit {
    ($($field:tt)*) => {
        tracing::debug!(
            event = $crate::logging::events::DISPATCH_SHORT_CIRCUIT,
            $($field)*
        )
    };
}

#[macro_export]
macro_rules! log_dispatch_error {
    ($($field:tt)*) => {
        tracing::error!(
            event = $crate::logging::events::DISPATCH_ERROR,
            $($field)*
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    // The global subscriber can only be installed once per process, so
    // these tests cover parsing and the event names only.

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("invalid"), None);
    }

    #[test]
    fn test_event_names_are_snake_case() {
        for name in [
            events::COMPILE_STARTED,
            events::CONTROLLER_ANALYZED,
            events::ARTIFACT_EMITTED,
            events::EMISSION_BLOCKED,
            events::DISPATCH_SHORT_CIRCUIT,
            events::DISPATCH_ERROR,
        ] {
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn test_macros_expand_without_subscriber() {
        crate::log_dispatch_short_circuit!(route = "GET /", step = 1, "resolver responded");
        crate::log_dispatch_error!(route = "GET /", "handler failed");
    }
}
