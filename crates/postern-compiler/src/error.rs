use thiserror::Error;

use crate::config::ConfigError;

/// Errors produced around compilation.
///
/// Problems in controllers are [`crate::Diagnostic`]s, not errors; this type
/// covers configuration, I/O, and the refusal to emit.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Project configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// At least one error diagnostic was collected.
    #[error("compilation produced {errors} error(s); artifact not emitted")]
    EmissionBlocked { errors: usize },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
