//! Error types for Sous

use thiserror::Error;

/// Main error type for Sous operations
#[derive(Error, Debug)]
pub enum SousError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors (bind, serve)
    #[error("Server error: {0}")]
    Server(String),
}

/// Result type alias for Sous operations
pub type Result<T> = std::result::Result<T, SousError>;
