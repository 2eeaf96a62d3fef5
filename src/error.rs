//! Service error types with HTTP status code mapping.
//!
//! [`SwapError`] is the central error type for the service. Each variant
//! maps to a specific HTTP status code and structured JSON error response.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{SlotId, SwapRequestId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2004,
///     "message": "conflict: slot is not swappable",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category            | HTTP Status                     |
/// |-----------|---------------------|---------------------------------|
/// | 1000–1999 | Validation          | 400 Bad Request                 |
/// | 2000–2999 | State / Not Found   | 404 / 403 / 409                 |
/// | 3000–3999 | Server              | 500 Internal Server Error       |
#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    /// Missing or malformed ids or fields.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Slot with the given ID was not found.
    #[error("slot not found: {0}")]
    SlotNotFound(SlotId),

    /// Swap request with the given ID was not found.
    #[error("swap request not found: {0}")]
    RequestNotFound(SwapRequestId),

    /// Caller is not the owner of the slot or not the addressed target.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Current state does not allow the operation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The ledger was observed in a state its invariants rule out.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SwapError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::SlotNotFound(_) => 2001,
            Self::RequestNotFound(_) => 2002,
            Self::Forbidden(_) => 2003,
            Self::Conflict(_) => 2004,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::InvariantViolation(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::SlotNotFound(_) | Self::RequestNotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvariantViolation(_) | Self::Persistence(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Shorthand for [`SwapError::Conflict`].
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Shorthand for [`SwapError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for [`SwapError::Forbidden`].
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Shorthand for [`SwapError::InvariantViolation`].
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}

impl From<sqlx::Error> for SwapError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<JsonRejection> for SwapError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for SwapError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for SwapError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
