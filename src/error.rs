use std::collections::BTreeMap;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{repository::RepositoryError, token::VerificationError};

/// Per-field validation messages, keyed by the offending field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// ApiError
///
/// Every way a request can be denied or fail. Each variant maps to one stable status
/// code; handlers and the authorization guard only ever return these.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No credential, or one that cannot be trusted (malformed, expired, unknown subject).
    #[error("Unauthorized")]
    Unauthorized,
    /// A trusted credential without the required role or ownership.
    #[error("Forbidden")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    ValidationFailed { message: String, errors: FieldErrors },
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }

    pub fn validation(errors: FieldErrors) -> Self {
        ApiError::ValidationFailed { message: "Validation error".to_string(), errors }
    }

    /// A validation failure that is not tied to a single input field.
    pub fn rejected(message: impl Into<String>) -> Self {
        ApiError::ValidationFailed { message: message.into(), errors: FieldErrors::new() }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a FieldErrors>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let errors = match &self {
            ApiError::ValidationFailed { errors, .. } if !errors.is_empty() => Some(errors),
            _ => None,
        };
        let body = ErrorBody { success: false, message: self.to_string(), errors };
        (self.status(), Json(body)).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        tracing::error!(error = %err, "repository failure");
        ApiError::Internal
    }
}

impl From<VerificationError> for ApiError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::Store(inner) => inner.into(),
            other => {
                tracing::debug!(reason = %other, "rejecting untrusted token");
                ApiError::Unauthorized
            }
        }
    }
}

/// A body that is not JSON, or does not fit the payload type, is a validation failure
/// like any other and is reported in the same envelope.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(status = %rejection.status(), reason = %rejection.body_text(), "rejecting request body");
        ApiError::rejected(rejection.body_text())
    }
}
