//! Error types for scai-ui

use thiserror::Error;

/// Result type for UI-layer operations
pub type UiResult<T> = Result<T, UiError>;

/// Errors raised by the backend client, stream client and map layer
#[derive(Debug, Error)]
pub enum UiError {
    /// Network communication error (connect, read, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Backend returned a non-success status
    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// Response body could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// Event stream could not be opened or broke mid-run
    #[error("Stream error: {0}")]
    Stream(String),

    /// Rendering library failed to load
    #[error("Render library load failed: {0}")]
    RenderLoad(String),

    /// Error from the shared library (config, JSON, invalid input)
    #[error(transparent)]
    Common(#[from] scai_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UiError {
    /// Status code for API errors
    pub fn status(&self) -> Option<u16> {
        match self {
            UiError::Api(status, _) => Some(*status),
            _ => None,
        }
    }
}
