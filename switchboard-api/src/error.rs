//! Error Types for the Switchboard API
//!
//! This module defines error handling for the HTTP layer:
//! - ErrorCode enum for categorizing errors
//! - ApiError struct carrying the caller-visible message
//! - IntoResponse implementation producing `{"error": "<message>"}`
//!
//! Internal causes are logged where they are converted; only generic
//! messages ever reach the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use switchboard_core::{
    AgentError, ConfigError, LlmError, SwitchboardError, ValidationError,
};

pub const EMPTY_MESSAGE: &str = "Message cannot be empty";
pub const INVALID_BODY: &str = "Invalid request body";
pub const CONFIGURATION_UNAVAILABLE: &str = "Agent configuration not available";
pub const PROCESSING_FAILED: &str = "An error occurred while processing your request";
pub const AUTHENTICATION_REQUIRED: &str = "Authentication required";
pub const ACCESS_FORBIDDEN: &str = "Access forbidden";

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each code maps to an HTTP status and to one category of the gateway's
/// failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed (e.g. empty message)
    ValidationFailed,

    /// Request body could not be parsed
    InvalidInput,

    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Missing or invalid credentials
    Unauthorized,

    /// Operation is not available to this caller
    Forbidden,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// No snapshot and no fallback agent to route to
    ConfigurationUnavailable,

    /// Backend client could not be constructed
    AgentCreationFailed,

    /// The chat completion call failed or timed out
    BackendCallFailed,

    /// Internal server error
    InternalError,

    /// Service is temporarily unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed | ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,

            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::ConfigurationUnavailable
            | ErrorCode::AgentCreationFailed
            | ErrorCode::BackendCallFailed
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the caller-visible message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => EMPTY_MESSAGE,
            ErrorCode::InvalidInput => INVALID_BODY,
            ErrorCode::Unauthorized => AUTHENTICATION_REQUIRED,
            ErrorCode::Forbidden => ACCESS_FORBIDDEN,
            ErrorCode::ConfigurationUnavailable => CONFIGURATION_UNAVAILABLE,
            ErrorCode::AgentCreationFailed
            | ErrorCode::BackendCallFailed
            | ErrorCode::InternalError => PROCESSING_FAILED,
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
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

/// Error returned by every handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable, caller-safe message
    pub message: String,
}

/// Wire shape of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn empty_message() -> Self {
        Self::from_code(ErrorCode::ValidationFailed)
    }

    pub fn invalid_body() -> Self {
        Self::from_code(ErrorCode::InvalidInput)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn configuration_unavailable() -> Self {
        Self::from_code(ErrorCode::ConfigurationUnavailable)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
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

/// Implement IntoResponse for ApiError to enable automatic error handling in Axum.
///
/// ```ignore
/// async fn handler() -> Result<Json<ChatResponse>, ApiError> {
///     Err(ApiError::empty_message())
/// }
/// ```
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorBody {
            error: self.message,
        });
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

/// Convert a domain error into a caller-safe ApiError.
///
/// The full cause goes to the log; the caller only sees the generic message.
impl From<SwitchboardError> for ApiError {
    fn from(err: SwitchboardError) -> Self {
        match &err {
            SwitchboardError::Validation(ValidationError::EmptyMessage) => {
                tracing::debug!(error = %err, "Rejected empty message");
                ApiError::empty_message()
            }
            SwitchboardError::Validation(_) => {
                tracing::warn!(error = %err, "Rejected malformed request");
                ApiError::invalid_body()
            }
            SwitchboardError::Config(ConfigError::Unavailable { .. }) => {
                tracing::error!(error = %err, "No usable agent configuration");
                ApiError::configuration_unavailable()
            }
            SwitchboardError::Config(_) => {
                tracing::error!(error = %err, "Configuration error");
                ApiError::from_code(ErrorCode::InternalError)
            }
            SwitchboardError::Agent(
                AgentError::CreationFailed { .. } | AgentError::InvalidConfiguration { .. },
            ) => {
                tracing::error!(error = %err, "Agent creation failed");
                ApiError::from_code(ErrorCode::AgentCreationFailed)
            }
            SwitchboardError::Llm(llm) => {
                match llm {
                    LlmError::RateLimited { retry_after_ms, .. } => tracing::warn!(
                        error = %err,
                        retry_after_ms,
                        "Backend rate limited the request"
                    ),
                    _ => tracing::error!(error = %err, "Backend call failed"),
                }
                ApiError::from_code(ErrorCode::BackendCallFailed)
            }
        }
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::InvalidInput.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorCode::ConfigurationUnavailable.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorCode::BackendCallFailed.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ErrorCode::ServiceUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_empty_message_conversion() {
        let err: ApiError = SwitchboardError::from(ValidationError::EmptyMessage).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Message cannot be empty");
    }

    #[test]
    fn test_backend_failure_hides_cause() {
        let err: ApiError = SwitchboardError::from(LlmError::RequestFailed {
            provider: "azure-openai".to_string(),
            status: 401,
            message: "Access denied due to invalid subscription key".to_string(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::BackendCallFailed);
        assert_eq!(err.message, PROCESSING_FAILED);
        assert!(!err.message.contains("subscription"));
    }

    #[test]
    fn test_config_unavailable_conversion() {
        let err: ApiError = SwitchboardError::from(ConfigError::Unavailable {
            reason: "no fallback agent".to_string(),
        })
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, CONFIGURATION_UNAVAILABLE);
    }

    #[test]
    fn test_creation_failure_is_generic() {
        let err: ApiError = SwitchboardError::from(AgentError::CreationFailed {
            key: "assistant:asst_1@https://x".to_string(),
            reason: "tls handshake".to_string(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::AgentCreationFailed);
        assert_eq!(err.message, PROCESSING_FAILED);
    }

    #[test]
    fn test_unusable_variant_payload_is_generic() {
        let err: ApiError = SwitchboardError::from(AgentError::InvalidConfiguration {
            variant: "newAgent".to_string(),
            reason: "configuration names neither an agent_id nor a model".to_string(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::AgentCreationFailed);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, PROCESSING_FAILED);
    }

    #[test]
    fn test_error_body_serialization() -> Result<(), serde_json::Error> {
        let body = ErrorBody {
            error: EMPTY_MESSAGE.to_string(),
        };
        assert_eq!(
            serde_json::to_string(&body)?,
            r#"{"error":"Message cannot be empty"}"#
        );
        Ok(())
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::invalid_body();
        assert_eq!(err.to_string(), "InvalidInput: Invalid request body");
    }
}
