use std::io;
use thiserror::Error;

/// Errors reported by the fallible parts of the service API.
///
/// Failures that happen while serving (bind errors inside a worker, accept
/// errors, failing probes) are logged or folded into health reports instead
/// of surfacing here.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The listening address could not be resolved or bound
    #[error("bind to {address} failed: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// A registered path did not compile into a regular expression
    #[error("invalid route pattern {pattern:?}: {source}")]
    InvalidRoute {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Routes and probes are frozen while the worker pool is running
    #[error("registration is closed while the service is serving")]
    AlreadyServing,

    /// Error when spawning a worker thread fails
    #[error("thread spawn failed: {0}")]
    ThreadSpawn(io::Error),

    /// Error while building a worker's event loop
    #[error("event loop initialization failed: {0}")]
    Runtime(io::Error),

    /// Configuration could not be loaded or deserialized
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Wrapper for standard I/O errors
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Type alias for Results using ServiceError as the error type
pub type Result<T> = std::result::Result<T, ServiceError>;
