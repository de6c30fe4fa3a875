//! Core Error Types
//!
//! Errors the core crate itself can produce. The application crate folds
//! these into `AppError`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// An event or card failed to serialize
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A wire value outside the accepted set (e.g. an unknown card collection)
    #[error("Validation error: {0}")]
    Validation(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
