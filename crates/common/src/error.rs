//! Common error types shared across crates.

use thiserror::Error;

/// Message returned for every decrypt rejection, whatever the cause.
pub const INVALID_TOKEN_MESSAGE: &str = "token could not be decrypted";

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::InvalidToken`] → 400
/// - [`ServiceError::NotFound`] → 404
/// - [`ServiceError::PayloadTooLarge`] → 413
/// - [`ServiceError::Internal`] → 500
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed — missing form field, unsafe filename, unknown folder.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An uploaded token was rejected by the cipher.
    ///
    /// Carries no detail: wrong key, tampering, truncation and expiry all
    /// look the same to the caller.
    #[error("{INVALID_TOKEN_MESSAGE}")]
    InvalidToken,

    /// The requested output file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The upload exceeded the configured body limit.
    #[error("payload too large")]
    PayloadTooLarge,

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::InvalidToken => 400,
            ServiceError::NotFound(_) => 404,
            ServiceError::PayloadTooLarge => 413,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::InvalidToken => "invalid_token",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::PayloadTooLarge => "payload_too_large",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    /// Message that is safe to expose to callers.
    ///
    /// Internal errors are collapsed to a fixed string; their details belong in logs.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Internal(_) => "internal error".into(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_codes() {
        assert_eq!(ServiceError::BadRequest("x".into()).http_status(), 400);
        assert_eq!(ServiceError::InvalidToken.http_status(), 400);
        assert_eq!(ServiceError::NotFound("x".into()).http_status(), 404);
        assert_eq!(ServiceError::PayloadTooLarge.http_status(), 413);
        assert_eq!(ServiceError::Internal("x".into()).http_status(), 500);
    }

    #[test]
    fn display_includes_message() {
        let e = ServiceError::BadRequest("missing file field".into());
        assert!(e.to_string().contains("missing file field"));
    }

    #[test]
    fn invalid_token_has_fixed_message() {
        assert_eq!(ServiceError::InvalidToken.to_string(), INVALID_TOKEN_MESSAGE);
        assert_eq!(ServiceError::InvalidToken.code(), "invalid_token");
    }

    #[test]
    fn internal_details_are_not_public() {
        let e = ServiceError::Internal("disk full at /var/data".into());
        assert_eq!(e.public_message(), "internal error");
    }
}
