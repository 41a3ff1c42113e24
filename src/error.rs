//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Why a presented credential was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No credential was presented at all.
    Missing,
    /// The credential does not match any stored hash.
    NotFound,
    /// The key (or token) was revoked.
    Inactive,
    /// The key (or token) is past its expiry.
    Expired,
}

impl AuthFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailure::Missing => "missing",
            AuthFailure::NotFound => "not_found",
            AuthFailure::Inactive => "inactive",
            AuthFailure::Expired => "expired",
        }
    }
}

/// Application-wide error type.
///
/// Every variant is recoverable per request. Each maps to a specific HTTP
/// status code and error code in the JSON body.
///
/// # Error Categories
///
/// - **Validation**: malformed input, always naming the offending field
/// - **Authentication / Authorization**: credential and permission failures
/// - **Rate limiting**: reported separately so clients can honour `Retry-After`
/// - **Conflict / Not found**: uniqueness violations and unknown resources
/// - **Storage**: store failures, never leaked verbatim to clients
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Request data is invalid.
    ///
    /// Returns HTTP 400 Bad Request. `field` names the rejected field so
    /// callers can report exactly what was wrong.
    #[error("Invalid value for '{field}': {message}")]
    Validation { field: String, message: String },

    /// Credential is missing, unknown, revoked or expired.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Authentication failed ({})", .0.as_str())]
    Authentication(AuthFailure),

    /// Credential is valid but lacks the capability for this operation.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("Access denied")]
    AuthorizationDenied,

    /// Per-minute request budget for this key and endpoint is exhausted.
    ///
    /// Returns HTTP 429 Too Many Requests with a `Retry-After` header.
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after_secs: u64 },

    /// A unique constraint was violated.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Requested resource does not exist (or is disabled).
    ///
    /// Returns HTTP 404 Not Found.
    #[error("{0} not found")]
    NotFound(String),

    /// The backing store failed for a reason other than a constraint.
    ///
    /// Returns HTTP 500. The message is logged, not returned.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database operation failed (e.g., connection error, query error).
    ///
    /// Returns HTTP 500. Constraint violations are mapped to `Conflict` /
    /// `NotFound` by the `From<sqlx::Error>` impl below before reaching here.
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl AppError {
    /// Shorthand for a validation failure on a named field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::AuthorizationDenied => StatusCode::FORBIDDEN,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation_error",
            AppError::Authentication(_) => "authentication_error",
            AppError::AuthorizationDenied => "authorization_denied",
            AppError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::Storage(_) | AppError::Database(_) => "internal_error",
        }
    }

    /// Message safe to show to API clients.
    ///
    /// Storage and database errors are replaced with a generic message.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Storage(_) | AppError::Database(_) => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }

    /// JSON error body in the shape every failure response uses.
    pub fn body(&self) -> serde_json::Value {
        let mut error = json!({
            "code": self.code(),
            "message": self.public_message(),
        });

        if let AppError::Validation { field, .. } = self {
            error["field"] = json!(field);
        }
        if let AppError::Authentication(reason) = self {
            error["reason"] = json!(reason.as_str());
        }

        json!({ "error": error })
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AppError::RateLimitExceeded { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Whether this is an internal failure that should be logged at error level.
    pub fn is_internal(&self) -> bool {
        matches!(self, AppError::Storage(_) | AppError::Database(_))
    }
}

/// Map sqlx errors onto the domain taxonomy.
///
/// - unique violations → `Conflict`
/// - foreign key violations → `NotFound` (the referenced parent is missing)
/// - `RowNotFound` → `NotFound`
/// - everything else → `Database`
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                let constraint = db_err.constraint().unwrap_or("unique constraint");
                AppError::Conflict(format!("duplicate value violates {constraint}"))
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound("Referenced record".to_string())
            }
            _ => AppError::Database(err),
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "validation_error",
///     "message": "Invalid value for 'title': field is not filterable",
///     "field": "title"
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_internal() {
            tracing::error!(error = %self, "Request failed with internal error");
        }

        let mut response = (self.status(), Json(self.body())).into_response();

        if let Some(secs) = self.retry_after() {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
