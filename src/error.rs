use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageGenError {
    #[error("Validation error ({field}): {message}")]
    Validation { field: String, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("A batch is already in progress")]
    BatchInProgress,

    #[error("Cancelled before dispatch")]
    Cancelled,
}

impl ImageGenError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ImageGenError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ImageGenError::Io {
            path: path.into(),
            source,
        }
    }

    /// Maps a non-200 status to the message shown next to the failed slot.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = match status {
            401 => "API key is invalid or expired".to_string(),
            429 => "rate limited".to_string(),
            500 => "server internal error".to_string(),
            _ => format!("HTTP {}", status),
        };
        let body = body.trim();
        let message = if body.is_empty() {
            message
        } else {
            format!("{} - {}", message, truncate(body, 200))
        };
        ImageGenError::Api { status, message }
    }

    /// True for the errors a single generation call can end with.
    pub fn is_per_call(&self) -> bool {
        matches!(
            self,
            ImageGenError::Network(_)
                | ImageGenError::Timeout(_)
                | ImageGenError::Api { .. }
                | ImageGenError::InvalidResponse(_)
                | ImageGenError::Cancelled
        )
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

impl From<serde_json::Error> for ImageGenError {
    fn from(err: serde_json::Error) -> Self {
        ImageGenError::Serialization(err.to_string())
    }
}

impl From<base64::DecodeError> for ImageGenError {
    fn from(err: base64::DecodeError) -> Self {
        ImageGenError::Decode(err.to_string())
    }
}

impl From<image::ImageError> for ImageGenError {
    fn from(err: image::ImageError) -> Self {
        ImageGenError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ImageGenError>;
