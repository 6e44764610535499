//! Error types for Trackdeck.

use thiserror::Error;

/// Main error type for Trackdeck operations.
#[derive(Error, Debug)]
pub enum TrackdeckError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Format mismatch: {0}")]
    FormatMismatch(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Timeline error: {0}")]
    Timeline(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Trackdeck operations.
pub type Result<T> = std::result::Result<T, TrackdeckError>;
