use mongodb::error::Error as MongoError;
use thiserror::Error;

use crate::dao::storage::StorageError;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection")]
    InitialPing {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to save event `{id}`")]
    SaveEvent {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load event `{id}`")]
    LoadEvent {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("event `{id}` carries an unreadable revision `{revision}`")]
    InvalidRevision { id: String, revision: String },
    #[error("revision conflict on event `{id}`")]
    RevisionConflict { id: String },
    #[error("event `{id}` does not exist")]
    MissingEvent { id: String },
}

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::RevisionConflict { id } => StorageError::conflict(id),
            MongoDaoError::MissingEvent { id } => StorageError::not_found(id),
            MongoDaoError::InvalidRevision { id, revision } => {
                StorageError::decode(id, format!("invalid revision `{revision}`"))
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
