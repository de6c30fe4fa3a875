//! Error Handling
//!
//! Unified error types for the application.
//! Uses thiserror for ergonomic error definitions.

use lease_insight_core::CoreError;
use lease_insight_llm::LlmError;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Session store unavailable (pool or connection failure)
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite errors (auto-converted from rusqlite::Error)
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors (missing or expired session, bad card index)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Requester is not on the allow-list
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Requester lacks the credits for a gated operation
    #[error("Insufficient credits: {0}")]
    InsufficientCredits(String),

    /// The entitlement service cannot be reached
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Provider call failures
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn insufficient_credits(msg: impl Into<String>) -> Self {
        Self::InsufficientCredits(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The message a client should see, without the variant prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::Database(_) | Self::Sqlite(_) => "Session store unavailable".to_string(),
            Self::Validation(m)
            | Self::NotFound(m)
            | Self::Forbidden(m)
            | Self::InsufficientCredits(m)
            | Self::ServiceUnavailable(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Serialization(e) => Self::Serialization(e),
            CoreError::Validation(m) => Self::Validation(m),
        }
    }
}

impl From<r2d2::Error> for AppError {
    fn from(err: r2d2::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
