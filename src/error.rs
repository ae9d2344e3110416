//! Error types for voxtask.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxtaskError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Session control
    #[error("A capture session is already active")]
    SessionActive,

    // Transcription errors
    #[error("Transcription model setup failed: {message}")]
    ModelLoad { message: String },

    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    // Rewrite errors (degradable; absorbed by the fallback chain)
    #[error("Rewrite failed: {message}")]
    Rewrite { message: String },

    #[error("Could not parse rewrite response")]
    RewriteInvalidResponse,

    // Task persistence errors
    #[error("No destination list selected")]
    NoListSelected,

    #[error("Task store error: {message}")]
    TaskSink { message: String },

    #[error("HTTP {status} from {service}")]
    HttpStatus { service: &'static str, status: u16 },

    // Transport
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxtaskError>;
