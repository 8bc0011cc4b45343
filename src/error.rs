//! Error types for Quotagate.

use thiserror::Error;

/// Main error type for Quotagate operations.
///
/// The admission path itself never fails; these errors only surface while
/// loading configuration or constructing a limiter.
#[derive(Error, Debug)]
pub enum QuotagateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A policy value that cannot be used to build a limiter
    #[error("Invalid admission policy: {field} {reason}")]
    InvalidPolicy {
        field: &'static str,
        reason: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for QuotagateError {
    fn from(err: ::config::ConfigError) -> Self {
        QuotagateError::Config(err.to_string())
    }
}

/// Result type alias for Quotagate operations.
pub type Result<T> = std::result::Result<T, QuotagateError>;
