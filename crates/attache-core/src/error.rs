//! Error types for attache.

use thiserror::Error;

/// Result type alias using attache's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for attache operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unknown draft or attachment identifier; lifecycle entry points
    /// report it as `false`
    #[error("Not found: {0}")]
    NotFound(String),

    /// A record resolved but its bytes are missing on disk
    #[error("File not found: {0}")]
    NotFoundFile(String),

    /// Storage directory could not be created or written
    #[error("Storage not writable: {0}")]
    NotWritable(String),

    /// A file record for this content hash already exists
    #[error("Duplicate content hash: {0}")]
    DuplicateHash(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error must reach an operator instead of being reported
    /// as a plain `false` by lifecycle entry points.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::NotWritable(_) | Error::Config(_))
    }
}
