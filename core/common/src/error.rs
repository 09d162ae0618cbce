//! Common error types for Syncboard.

use thiserror::Error;

/// Top-level error type for Syncboard operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A remote request did not complete within its deadline.
    #[error("Request timed out")]
    Timeout,

    /// The remote transport reported a failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The operation was cancelled by its session.
    #[error("Operation cancelled")]
    Cancelled,

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

    /// Reading or writing the local clipboard failed.
    #[error("Clipboard error: {0}")]
    Clipboard(String),

    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the failure is worth retrying on the next attempt or poll.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Timeout | Error::Transport(_) | Error::Io(_))
    }

    /// Whether this is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
