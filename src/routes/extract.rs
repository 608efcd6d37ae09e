use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{dto::validation::validate_device_id, error::AppError, services::identity::generate_device_id};

/// Header carrying the caller's device identifier.
pub const DEVICE_HEADER: &str = "x-device-id";

/// Device the request acts for, taken from `X-Device-Id`.
///
/// Requests without the header get a fresh identifier; handlers that need an
/// existing device call [`DeviceId::require`].
#[derive(Debug, Clone)]
pub struct DeviceId {
    pub id: String,
    /// True when the identifier was generated for this request.
    pub issued: bool,
}

impl DeviceId {
    /// Reject requests that did not name a device.
    pub fn require(self) -> Result<String, AppError> {
        if self.issued {
            return Err(AppError::BadRequest("missing X-Device-Id header".into()));
        }
        Ok(self.id)
    }
}

impl<S> FromRequestParts<S> for DeviceId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(DEVICE_HEADER) else {
            return Ok(Self {
                id: generate_device_id(),
                issued: true,
            });
        };

        let id = value
            .to_str()
            .map_err(|_| AppError::BadRequest("X-Device-Id must be visible ASCII".into()))?;
        validate_device_id(id).map_err(|err| AppError::BadRequest(err.to_string()))?;

        Ok(Self {
            id: id.to_owned(),
            issued: false,
        })
    }
}
