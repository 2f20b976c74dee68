//! Error types for Lumaview.

use thiserror::Error;

/// Domain error for frame and state validation.
#[derive(Error, Debug)]
pub enum LumaviewError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for Lumaview operations.
pub type Result<T> = std::result::Result<T, LumaviewError>;
