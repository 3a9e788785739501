//! Error types for streamscribe.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamscribeError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Capture errors
    #[error("Capture format mismatch: expected {expected}, got {actual}")]
    CaptureFormatMismatch { expected: String, actual: String },

    // Window emission errors
    #[error("Failed to write window WAV: {message}")]
    WavWrite { message: String },

    #[error("Failed to read WAV: {message}")]
    WavRead { message: String },

    // Engine errors
    #[error("Engine {name} did not become ready within {timeout_sec} s")]
    EngineWarmupTimeout { name: String, timeout_sec: f64 },

    #[error("Engine {name} timed out transcribing a window")]
    EngineTranscribeTimeout { name: String },

    #[error("Engine returned a malformed response: {message}")]
    EngineResponse { message: String },

    #[error("Engine error: {message}")]
    Engine { message: String },

    // Pipeline lifecycle
    #[error("Pipeline is shut down")]
    PipelineClosed,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, StreamscribeError>;
