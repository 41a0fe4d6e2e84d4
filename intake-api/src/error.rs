//! Error Types for the intake API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! Every error body carries `"success": false` next to the code and a
//! caller-safe message. Store failures never leak their internal detail.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use intake_core::{StorageError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message returned for every server-side failure.
pub const GENERIC_SERVER_ERROR: &str = "Server error";

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code and represents
/// a category of error that can occur during API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Required field is missing from request
    MissingField,

    /// Request contains invalid input data
    InvalidInput,

    /// Submission clashes with an existing application
    DuplicateApplication,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested application does not exist
    ApplicationNotFound,

    // ========================================================================
    // Server Errors (500)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Database operation failed
    DatabaseError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::MissingField
            | ErrorCode::InvalidInput
            | ErrorCode::DuplicateApplication => StatusCode::BAD_REQUEST,

            ErrorCode::ApplicationNotFound => StatusCode::NOT_FOUND,

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::MissingField => "Required fields missing",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::DuplicateApplication => "Application already exists",
            ErrorCode::ApplicationNotFound => "Not found",
            ErrorCode::InternalError => GENERIC_SERVER_ERROR,
            ErrorCode::DatabaseError => GENERIC_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (missing field names, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

/// Wire shape of an error: `{ success: false, code, message, details? }`.
#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    code: ErrorCode,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    /// Create a MissingField error naming every absent field.
    pub fn missing_fields(fields: &[String]) -> Self {
        Self::from_code(ErrorCode::MissingField)
            .with_details(serde_json::json!({ "missing": fields }))
    }

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a DuplicateApplication error.
    pub fn duplicate_application() -> Self {
        Self::from_code(ErrorCode::DuplicateApplication)
    }

    /// Create an ApplicationNotFound error.
    pub fn application_not_found(application_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ApplicationNotFound,
            format!("Application {} not found", application_id),
        )
    }

    /// Create an InternalError.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a DatabaseError with the generic caller-facing message.
    pub fn database_error() -> Self {
        Self::from_code(ErrorCode::DatabaseError)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            success: false,
            code: self.code,
            message: &self.message,
            details: self.details.as_ref(),
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

/// Convert from StorageError to ApiError.
impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Duplicate { constraint } => {
                tracing::info!(%constraint, "Rejected duplicate application");
                ApiError::duplicate_application()
            }
            other => {
                // Log the full error; the caller only sees the generic message
                tracing::error!(error = %other, "Store operation failed");
                ApiError::database_error()
            }
        }
    }
}

/// Convert from ValidationError to ApiError.
impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::RequiredFieldsMissing { fields } => ApiError::missing_fields(&fields),
            ValidationError::InvalidPayload { reason } => ApiError::invalid_input(reason),
        }
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::MissingField.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::DuplicateApplication.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::ApplicationNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::DatabaseError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ErrorCode::InternalError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_storage_errors_hide_internal_detail() {
        let err: ApiError = StorageError::Query {
            reason: "relation \"applications\" does not exist".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert_eq!(err.message, GENERIC_SERVER_ERROR);

        let err: ApiError = StorageError::TransactionFailed {
            reason: "connection reset".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("reset"));
    }

    #[test]
    fn test_duplicate_is_client_error() {
        let err: ApiError = StorageError::Duplicate {
            constraint: "applications_pan_key".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.message.contains("applications_pan_key"));
    }

    #[test]
    fn test_missing_fields_carry_details() {
        let err: ApiError = ValidationError::RequiredFieldsMissing {
            fields: vec!["contact.email".to_string()],
        }
        .into();
        assert_eq!(err.code, ErrorCode::MissingField);
        assert_eq!(err.message, "Required fields missing");
        assert_eq!(
            err.details,
            Some(serde_json::json!({ "missing": ["contact.email"] }))
        );
    }

    #[tokio::test]
    async fn test_error_body_has_success_false() -> Result<(), Box<dyn std::error::Error>> {
        let response = ApiError::application_not_found("UNKNOWN-ID").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)?;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "APPLICATION_NOT_FOUND");
        assert_eq!(body["message"], "Application UNKNOWN-ID not found");
        assert!(body.get("details").is_none());
        Ok(())
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::internal_error("boom");
        assert_eq!(format!("{}", err), "InternalError: boom");
    }
}
