//! Error taxonomy shared by every pipeline stage.
//!
//! An [`ApiError`] is the one error shape a client ever sees. Its
//! [`ErrorKind`] fixes the stable name, the numeric code and the default
//! HTTP status, so clients can branch on `name`/`code` without parsing
//! messages.

use http::StatusCode;
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Generic message used for faults whose details must not reach the client.
pub const UNEXPECTED_ERROR_MESSAGE: &str = "an unexpected error occurred";

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Stable classification of every error the pipeline can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller is not (successfully) authenticated.
    NotAuthenticated,
    /// No acceptable access key accompanied the request.
    AccessKeyNotAccepted,
    /// The caller is authenticated but not allowed to perform the action.
    PermissionDenied,
    /// The authenticated user has been disabled.
    UserDisabled,
    /// The request is malformed.
    InvalidArgument,
    /// No tenant configuration matches the request.
    TenantNotFound,
    /// The tenant configuration exists but cannot be used.
    InvalidConfiguration,
    /// No route matches the request path.
    ResourceNotFound,
    /// A route matches the path but not the method.
    MethodNotAllowed,
    /// A tenant or credential lookup exceeded its deadline.
    ResolutionTimeout,
    /// The whole request exceeded its deadline.
    RequestTimeout,
    /// The server is draining or a collaborator is unavailable.
    ServiceUnavailable,
    /// Anything not anticipated, including recovered panics.
    UnexpectedError,
}

impl ErrorKind {
    /// Stable machine-readable name, serialized as `error.name`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::NotAuthenticated => "NotAuthenticated",
            Self::AccessKeyNotAccepted => "AccessKeyNotAccepted",
            Self::PermissionDenied => "PermissionDenied",
            Self::UserDisabled => "UserDisabled",
            Self::InvalidArgument => "InvalidArgument",
            Self::TenantNotFound => "TenantNotFound",
            Self::InvalidConfiguration => "InvalidConfiguration",
            Self::ResourceNotFound => "ResourceNotFound",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::ResolutionTimeout => "ResolutionTimeout",
            Self::RequestTimeout => "RequestTimeout",
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::UnexpectedError => "UnexpectedError",
        }
    }

    /// Stable numeric code, serialized as `error.code`.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::NotAuthenticated => 101,
            Self::AccessKeyNotAccepted => 102,
            Self::PermissionDenied => 103,
            Self::UserDisabled => 104,
            Self::InvalidArgument => 108,
            Self::TenantNotFound => 110,
            Self::InvalidConfiguration => 111,
            Self::ResourceNotFound => 112,
            Self::MethodNotAllowed => 113,
            Self::ResolutionTimeout => 114,
            Self::RequestTimeout => 115,
            Self::ServiceUnavailable => 116,
            Self::UnexpectedError => 10_000,
        }
    }

    /// HTTP status used when nothing more specific was declared.
    #[must_use]
    pub fn default_status(self) -> StatusCode {
        match self {
            Self::NotAuthenticated | Self::AccessKeyNotAccepted | Self::UserDisabled => {
                StatusCode::UNAUTHORIZED
            }
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::InvalidArgument | Self::InvalidConfiguration => StatusCode::BAD_REQUEST,
            Self::TenantNotFound | Self::ResourceNotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::ResolutionTimeout | Self::RequestTimeout | Self::ServiceUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::UnexpectedError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message used when an error of this kind is raised without one.
    #[must_use]
    pub fn default_message(self) -> &'static str {
        match self {
            Self::NotAuthenticated => "authentication required",
            Self::AccessKeyNotAccepted => "api key required",
            Self::PermissionDenied => "permission denied",
            Self::UserDisabled => "user is disabled",
            Self::InvalidArgument => "invalid argument",
            Self::TenantNotFound => "tenant not found",
            Self::InvalidConfiguration => "tenant configuration is invalid",
            Self::ResourceNotFound => "resource not found",
            Self::MethodNotAllowed => "method not allowed",
            Self::ResolutionTimeout => "authentication lookup timed out",
            Self::RequestTimeout => "request timed out",
            Self::ServiceUnavailable => "service unavailable",
            Self::UnexpectedError => UNEXPECTED_ERROR_MESSAGE,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// Structured, client-visible error.
///
/// Serializes to the inner object of the wire envelope; wrap it in
/// [`ErrorEnvelope`] to produce `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    info: Option<Map<String, Value>>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            info: None,
        }
    }

    /// Error of `kind` carrying the kind's default message.
    #[must_use]
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }

    /// The generic 500 used whenever internals must stay hidden.
    #[must_use]
    pub fn unexpected() -> Self {
        Self::from_kind(ErrorKind::UnexpectedError)
    }

    pub fn not_authenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotAuthenticated, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Attaches one kind-specific field, serialized under `error.info`.
    #[must_use]
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.info
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn info(&self) -> Option<&Map<String, Value>> {
        self.info.as_ref()
    }

    /// Status derived from the declared kind.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.kind.default_status()
    }
}

impl From<ErrorKind> for ApiError {
    fn from(kind: ErrorKind) -> Self {
        Self::from_kind(kind)
    }
}

#[derive(serde::Serialize)]
struct ApiErrorRepr<'a> {
    name: &'static str,
    code: u32,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<&'a Map<String, Value>>,
}

impl Serialize for ApiError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ApiErrorRepr {
            name: self.kind.name(),
            code: self.kind.code(),
            message: &self.message,
            info: self.info.as_ref(),
        }
        .serialize(serializer)
    }
}

/// Top-level wire envelope: `{"error": {...}}`.
#[derive(Debug, serde::Serialize)]
pub struct ErrorEnvelope<'a> {
    pub error: &'a ApiError,
}

impl<'a> From<&'a ApiError> for ErrorEnvelope<'a> {
    fn from(error: &'a ApiError) -> Self {
        Self { error }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_name_code_message() {
        let err = ApiError::not_authenticated("session expired");
        let json = serde_json::to_value(ErrorEnvelope::from(&err)).unwrap();

        assert_eq!(json["error"]["name"], "NotAuthenticated");
        assert_eq!(json["error"]["code"], 101);
        assert_eq!(json["error"]["message"], "session expired");
        assert!(json["error"].get("info").is_none());
    }

    #[test]
    fn info_fields_are_nested_under_info() {
        let err = ApiError::from_kind(ErrorKind::MethodNotAllowed).with_info("allowed", "GET");
        let json = serde_json::to_value(ErrorEnvelope::from(&err)).unwrap();
        assert_eq!(json["error"]["info"]["allowed"], "GET");
    }

    #[test]
    fn status_mapping_follows_kind() {
        assert_eq!(ApiError::not_authenticated("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from_kind(ErrorKind::UserDisabled).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from_kind(ErrorKind::TenantNotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::unexpected().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::from_kind(ErrorKind::ResolutionTimeout).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn unexpected_uses_generic_message() {
        let err = ApiError::unexpected();
        assert_eq!(err.message(), UNEXPECTED_ERROR_MESSAGE);
        assert_eq!(err.kind().name(), "UnexpectedError");
    }
}
