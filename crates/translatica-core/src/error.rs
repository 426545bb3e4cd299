//! Error types for the translation core

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Caller-correctable input problem (missing or blank text).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Inference attempted before the model finished loading.
    #[error("Model not loaded. Call load() first.")]
    NotLoaded,

    #[error("Failed to load model: {0}")]
    ModelLoadError(String),

    #[error("Inference failed: {0}")]
    InferenceError(String),

    #[error("Tokenization failed: {0}")]
    TokenizationError(String),

    #[error("Translation timed out after {0} ms")]
    Timeout(u64),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Requested device is not available: {0}")]
    DeviceUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tensor error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl Error {
    /// Whether the caller can fix the request and try again.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::DatabaseError(err.to_string())
    }
}
