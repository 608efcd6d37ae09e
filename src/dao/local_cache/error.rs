use std::{io, path::PathBuf};

use thiserror::Error;

/// Result alias for local cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Failures of the local key-value cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache directory could not be created.
    #[error("failed to prepare cache directory `{path}`")]
    Prepare {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Reading an entry from disk failed.
    #[error("failed to read cache entry `{key}`")]
    Read {
        key: String,
        #[source]
        source: io::Error,
    },
    /// Writing or removing an entry on disk failed.
    #[error("failed to write cache entry `{key}`")]
    Write {
        key: String,
        #[source]
        source: io::Error,
    },
    /// A stored value is not the JSON shape expected for its key.
    #[error("cache entry `{key}` is malformed")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// A value could not be encoded for storage.
    #[error("cache entry `{key}` could not be encoded")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
