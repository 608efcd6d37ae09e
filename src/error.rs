use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::{local_cache::CacheError, storage::StorageError};

/// Failures of the synchronization layer, independent of the backend.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The event has no document anywhere. Terminal.
    #[error("event `{0}` not found")]
    NotFound(String),
    /// The remote store could not be reached.
    #[error("remote store unavailable")]
    Transport(#[source] StorageError),
    /// A conditional write kept losing against concurrent writers.
    #[error("write conflict on `{0}`")]
    Conflict(String),
    /// A stored document could not be decoded.
    #[error("malformed document: {0}")]
    Decode(String),
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { key } => SyncError::NotFound(key),
            StorageError::Conflict { key } => SyncError::Conflict(key),
            StorageError::Decode { key, message } => SyncError::Decode(format!("{key}: {message}")),
            unavailable @ StorageError::Unavailable { .. } => SyncError::Transport(unavailable),
        }
    }
}

impl SyncError {
    /// Whether loading should fall through to the next source.
    pub fn allows_fallback(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::Decode(_))
    }
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Synchronization with the event sources failed.
    #[error(transparent)]
    Sync(#[from] SyncError),
    /// The local cache could not be read or written.
    #[error("local cache failure")]
    Cache(#[from] CacheError),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Sync(err.into())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Sync(SyncError::NotFound(id)) => {
                AppError::NotFound(format!("event `{id}` not found"))
            }
            ServiceError::Sync(SyncError::Conflict(key)) => {
                AppError::Conflict(format!("concurrent update on `{key}`"))
            }
            ServiceError::Sync(err @ SyncError::Transport(_)) => {
                AppError::ServiceUnavailable(err.to_string())
            }
            ServiceError::Sync(err @ SyncError::Decode(_)) => {
                AppError::ServiceUnavailable(err.to_string())
            }
            ServiceError::Cache(source) => AppError::Internal(source.to_string()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_onto_sync_taxonomy() {
        assert!(matches!(
            SyncError::from(StorageError::not_found("e1")),
            SyncError::NotFound(id) if id == "e1"
        ));
        assert!(matches!(
            SyncError::from(StorageError::conflict("e1")),
            SyncError::Conflict(_)
        ));
        assert!(SyncError::from(StorageError::decode("e1", "bad")).allows_fallback());
        assert!(!SyncError::NotFound("e1".into()).allows_fallback());
    }

    #[test]
    fn not_found_and_pin_mismatch_are_user_visible() {
        let not_found = AppError::from(ServiceError::Sync(SyncError::NotFound("e1".into())));
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let pin = AppError::from(ServiceError::Unauthorized("wrong PIN".into()));
        assert_eq!(pin.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
