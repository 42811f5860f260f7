use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use yfgate_core::{SourceError, SourceErrorKind, ValidationError};

/// Body returned for rate-limited requests, whatever the upstream said.
pub const RATE_LIMITED_MESSAGE: &str = "Too Many Requests. Please try again later.";

/// Error surfaced by a route handler.
///
/// Rate limits map to `429`; everything else is a `500` carrying the message.
#[derive(Debug)]
pub struct ApiError(pub SourceError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            SourceErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SourceError> for ApiError {
    fn from(error: SourceError) -> Self {
        Self(error)
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self(error.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match status {
            StatusCode::TOO_MANY_REQUESTS => RATE_LIMITED_MESSAGE,
            _ => self.0.message(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
