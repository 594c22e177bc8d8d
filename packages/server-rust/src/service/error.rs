//! JSON error responses.

use axum::response::{IntoResponse, Response};
use axum::Json;
use gatehouse_core::{ApiError, ErrorEnvelope, ErrorKind, Rejection};
use http::StatusCode;

/// An [`ApiError`] paired with the status it is sent with.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub error: ApiError,
    pub status: StatusCode,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(error: ApiError, status: StatusCode) -> Self {
        Self { error, status }
    }
}

impl From<ApiError> for ErrorResponse {
    fn from(error: ApiError) -> Self {
        let status = error.status();
        Self { error, status }
    }
}

impl From<ErrorKind> for ErrorResponse {
    fn from(kind: ErrorKind) -> Self {
        ApiError::from_kind(kind).into()
    }
}

impl From<Rejection> for ErrorResponse {
    fn from(rejection: Rejection) -> Self {
        let status = rejection.status();
        let policy = rejection.policy();
        let error = rejection.into_error().with_info("policy", policy);
        Self { error, status }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        // Json sets `content-type: application/json`.
        (self.status, Json(ErrorEnvelope::from(&self.error))).into_response()
    }
}
