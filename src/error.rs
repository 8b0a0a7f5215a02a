// src/error.rs
// Error types for the tutor chat client

use thiserror::Error;

/// Main error type for the tutor-stream library
#[derive(Error, Debug)]
pub enum TutorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Connection refused, DNS failure, dropped stream or a non-2xx reply
    #[error("transport error: {0}")]
    Transport(String),

    #[error("generation cancelled")]
    Cancelled,

    /// The accumulated reply held no recoverable JSON object
    #[error("malformed structured output: {message}")]
    MalformedStructuredOutput { message: String, raw: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Result using TutorError
pub type Result<T> = std::result::Result<T, TutorError>;

impl TutorError {
    pub fn is_transport(&self) -> bool {
        matches!(self, TutorError::Transport(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TutorError::Cancelled)
    }

    /// Raw model text attached to a structured-output failure
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            TutorError::MalformedStructuredOutput { raw, .. } => Some(raw),
            _ => None,
        }
    }

    /// Banner text for structured-output screens.
    /// Keeps "network error" apart from "model returned no usable content".
    pub fn user_message(&self) -> String {
        match self {
            TutorError::Transport(msg) => format!("Network error: {}", msg),
            TutorError::MalformedStructuredOutput { message, .. } => {
                format!("The model returned no usable content ({}). Try again.", message)
            }
            TutorError::Cancelled => "Generation was cancelled.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for TutorError {
    fn from(err: reqwest::Error) -> Self {
        TutorError::Transport(err.to_string())
    }
}
