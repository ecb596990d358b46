//! Error types for offset detection and merging

use thiserror::Error;

/// Errors that can occur while synchronizing two sources
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    #[error("Required tool not found: {0}")]
    ToolUnavailable(String),

    #[error("Invalid sample buffer: {0}")]
    InvalidBuffer(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Sample rate conversion failed: {0}")]
    Resample(String),

    #[error("FFT error: {0}")]
    FftError(String),

    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    #[error("Merge failed: {0}")]
    MergeFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Decode failure for `path`
    pub fn decode(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
