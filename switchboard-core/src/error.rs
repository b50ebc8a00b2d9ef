//! Error types for switchboard operations

use thiserror::Error;

/// Configuration store and remote source errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Configuration unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Fetch from {source_name} failed: {reason}")]
    FetchFailed { source_name: String, reason: String },

    #[error("Fetch from {source_name} timed out after {after_ms}ms")]
    FetchTimeout { source_name: String, after_ms: u64 },

    #[error("Invalid configuration snapshot: {reason}")]
    InvalidSnapshot { reason: String },

    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Agent handle construction errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("Variant {variant} has an unusable agent configuration: {reason}")]
    InvalidConfiguration { variant: String, reason: String },

    #[error("Agent creation failed for {key}: {reason}")]
    CreationFailed { key: String, reason: String },
}

/// Backend chat call errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Call to {provider} timed out after {after_ms}ms")]
    Timeout { provider: String, after_ms: u64 },
}

/// Inbound request validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Malformed request body: {reason}")]
    MalformedBody { reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Master error type for all switchboard errors.
#[derive(Debug, Clone, Error)]
pub enum SwitchboardError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl SwitchboardError {
    /// True when no snapshot could ever be loaded.
    pub fn is_config_unavailable(&self) -> bool {
        matches!(self, Self::Config(ConfigError::Unavailable { .. }))
    }
}

/// Result type alias for switchboard operations.
pub type SwitchboardResult<T> = Result<T, SwitchboardError>;

// =============================================================================
// TESTS
// =============================================================================
