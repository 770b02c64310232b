//! Common error types for VaultSync.

use thiserror::Error;

/// Top-level error type for VaultSync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The configured remote root does not resolve to a remote directory.
    #[error("Remote root not found: {0}")]
    RootNotFound(String),

    /// An operation against the local replica failed.
    #[error("Local I/O error: {0}")]
    LocalIo(String),

    /// An operation against the remote replica failed.
    #[error("Remote I/O error: {0}")]
    RemoteIo(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Settings could not be loaded or applied.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error reports a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
