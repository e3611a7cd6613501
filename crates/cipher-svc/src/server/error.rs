//! Conversion of internal errors into HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{protocol::ErrorResponse, ServiceError};
use tracing::error;

use crate::crypto::CipherError;
use crate::storage::StorageError;

/// Handler error: a [`ServiceError`] that renders as a JSON error body.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(ServiceError::BadRequest(msg.into()))
    }

    pub fn internal(msg: impl ToString) -> Self {
        Self(ServiceError::Internal(msg.to_string()))
    }
}

impl From<CipherError> for ApiError {
    fn from(err: CipherError) -> Self {
        if err.is_rejection() {
            Self(ServiceError::InvalidToken)
        } else {
            Self::internal(err)
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UnsafeFilename => Self::bad_request("unsafe filename"),
            StorageError::UnknownFolder(_) => Self::bad_request("invalid folder"),
            StorageError::NotFound(name) => Self(ServiceError::NotFound(name)),
            StorageError::Io(e) => Self::internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ServiceError::Internal(detail) = &self.0 {
            error!(error = %detail, "request failed");
        }
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}
