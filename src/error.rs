//! Error types for the pull server core.

use thiserror::Error;

/// Errors produced by the rotation, scheduling and persistence layers.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration (empty or out-of-range wake hours, bad timezone, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisted state could not be read or parsed
    #[error("Failed to read persisted state: {0}")]
    PersistenceRead(String),

    /// Persisted state could not be written
    #[error("Failed to write persisted state: {0}")]
    PersistenceWrite(String),

    /// Selection was requested on an empty image pool
    #[error("No image available")]
    EmptyPool,

    /// Filesystem error outside of state persistence (listing, publishing)
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
