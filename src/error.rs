//! Request-boundary error taxonomy and the JSON response envelope.
//!
//! Every handler returns `Result<_, ApiError>`; the `IntoResponse` impl maps each variant
//! 1:1 onto a status code and wraps it in the `{success, message, data, error}` envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{auth::AuthRejection, repository::RepositoryError};

/// FieldError
///
/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// ErrorBody
///
/// The `error` member of a failed response: a stable machine-readable code plus optional
/// field-level detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    pub code: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}

/// ApiResponse
///
/// The envelope carried by every response, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    /// A successful response that carries only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
            error: None,
        }
    }
}

/// ApiError
///
/// Terminal failure of a request. Nothing in the service retries.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing input, with per-field detail.
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    /// A request that is well formed but not acceptable (missing query, self-deletion).
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthRejection),

    /// Authenticated, but not the owner and not an admin.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Absent, or present but not visible to the caller. The two are indistinguishable.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate username or email.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Persistence or unexpected failure. The detail is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) | ApiError::Conflict(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Authentication(rejection) => rejection.code(),
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The caller-facing message.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Validation(_) => "Validation error".to_string(),
            ApiError::BadRequest(message)
            | ApiError::Forbidden(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message) => message.clone(),
            ApiError::Authentication(rejection) => rejection.to_string(),
            ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(message) => ApiError::Conflict(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            ApiError::Internal(detail) => tracing::error!(detail = %detail, "request failed"),
            ApiError::Authentication(rejection) => {
                tracing::debug!(reason = %rejection, "authentication rejected")
            }
            _ => tracing::debug!(status = status.as_u16(), error = %self, "request rejected"),
        }

        let code = self.code().to_string();
        let message = self.public_message();
        let details = match self {
            ApiError::Validation(details) => details,
            _ => Vec::new(),
        };

        let body: ApiResponse<()> = ApiResponse {
            success: false,
            message: Some(message),
            data: None,
            error: Some(ErrorBody { code, details }),
        };

        (status, Json(body)).into_response()
    }
}
