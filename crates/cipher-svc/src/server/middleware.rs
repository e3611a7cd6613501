//! Axum middleware settings applied to the router.
//!
//! Includes request tracing, timeout enforcement, and the upload body limit.

use std::time::Duration;

use axum::{body::Body, http::Request};
use tracing::Span;
use uuid::Uuid;

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Root span for each request, tagged with a fresh request id.
///
/// Only the method and path are recorded; query strings and bodies never are.
pub fn make_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %request.method(),
        path = %request.uri().path(),
    )
}
