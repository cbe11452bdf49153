//! Unified error types for Mosaic

use thiserror::Error;

/// Unified error type for all Mosaic operations
#[derive(Error, Debug)]
pub enum MosaicError {
    // Signature errors
    #[error("Extraction error: {0}")]
    Extraction(String),

    // Planning errors
    #[error("Planning error in pass {pass}: {message}")]
    Planning { pass: u8, message: String },

    // Inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("API limit reached: {0}")]
    ApiLimit(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Scheduling errors
    #[error("Scheduling invariant violated: {0}")]
    Scheduling(String),

    // Pattern cache errors
    #[error("Pattern error: {0}")]
    Pattern(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl MosaicError {
    /// Build a planning error for a given pass number
    pub fn planning(pass: u8, message: impl Into<String>) -> Self {
        Self::Planning {
            pass,
            message: message.into(),
        }
    }

    /// Whether the error aborts a whole plan rather than a single atom
    pub fn is_plan_fatal(&self) -> bool {
        matches!(
            self,
            Self::Planning { .. } | Self::Scheduling(_) | Self::Config(_) | Self::Cancelled(_)
        )
    }
}

/// Result type alias using MosaicError
pub type Result<T> = std::result::Result<T, MosaicError>;
