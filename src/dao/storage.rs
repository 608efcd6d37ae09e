use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or answered with a transport failure.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A conditional write lost against a concurrent writer.
    #[error("revision conflict on `{key}`")]
    Conflict { key: String },
    /// The targeted document does not exist.
    #[error("document `{key}` not found")]
    NotFound { key: String },
    /// A stored document could not be decoded into the canonical shape.
    #[error("malformed document `{key}`: {message}")]
    Decode { key: String, message: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a revision conflict for the given document key.
    pub fn conflict(key: impl Into<String>) -> Self {
        StorageError::Conflict { key: key.into() }
    }

    /// Construct a not-found error for the given document key.
    pub fn not_found(key: impl Into<String>) -> Self {
        StorageError::NotFound { key: key.into() }
    }

    /// Construct a decode error for the given document key.
    pub fn decode(key: impl Into<String>, message: impl ToString) -> Self {
        StorageError::Decode {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error is a lost compare-and-swap.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}
