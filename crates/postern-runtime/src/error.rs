use thiserror::Error;

use postern_compiler::CompileError;

/// A request that could not be dispatched.
///
/// Nothing is retried; the serving runtime turns these into error replies.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A required value was absent from the request.
    #[error("missing value for parameter '{parameter}' ({expression})")]
    Extraction {
        parameter: String,
        expression: String,
    },

    /// A custom resolver failed.
    #[error("resolver '{resolver}' failed for parameter '{parameter}': {source}")]
    Resolver {
        resolver: String,
        parameter: String,
        #[source]
        source: anyhow::Error,
    },

    /// The inline handler failed.
    #[error("handler '{handler}' failed: {source}")]
    Handler {
        handler: String,
        #[source]
        source: anyhow::Error,
    },

    /// The offloaded task failed or could not be run.
    #[error("offloaded task '{task}' failed: {source}")]
    Offload {
        task: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A route that could not be mounted.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("no handler registered for '{0}'")]
    MissingHandler(String),

    #[error("route {route} uses resolver '{resolver}', which is not registered")]
    MissingResolver { route: String, resolver: String },

    #[error("route {route} is offloaded but no worker pool is configured")]
    MissingPool { route: String },

    #[error("worker pool has no task '{task}' for route {route}")]
    MissingTask { route: String, task: String },

    /// The serving runtime refused a registration.
    #[error("serving runtime rejected {what}: {message}")]
    Rejected { what: String, message: String },

    /// The artifact could not be read.
    #[error(transparent)]
    Artifact(#[from] CompileError),
}
