//! Error types for parlo.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscribeError {
    // Configuration-time errors, returned synchronously from setup()
    #[error("Locale {locale} is not supported by the active backend")]
    UnsupportedLocale { locale: String },

    #[error("Recognizer unavailable: {message}")]
    RecognizerUnavailable { message: String },

    // Session-start errors
    #[error("Failed to start recognition task: {message}")]
    SetupFailure { message: String },

    // Runtime errors
    #[error("No active recognition task")]
    NotStarted,

    #[error("Unsupported audio format: {message}")]
    InvalidFormat { message: String },

    // Opaque backend passthrough
    #[error("Backend error: {message}")]
    Backend { message: String },
}

impl TranscribeError {
    /// Wrap an arbitrary backend failure for opaque passthrough.
    pub fn backend(message: impl Into<String>) -> Self {
        TranscribeError::Backend {
            message: message.into(),
        }
    }

    /// Serializable classification carried by `TranscriptionEvent::Error`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranscribeError::UnsupportedLocale { .. } => ErrorKind::UnsupportedLocale,
            TranscribeError::RecognizerUnavailable { .. } => ErrorKind::RecognizerUnavailable,
            TranscribeError::SetupFailure { .. } => ErrorKind::SetupFailure,
            TranscribeError::NotStarted => ErrorKind::NotStarted,
            TranscribeError::InvalidFormat { .. } => ErrorKind::InvalidFormat,
            TranscribeError::Backend { .. } => ErrorKind::Backend,
        }
    }
}

/// Wire-friendly classification of a `TranscribeError`.
///
/// Event streams carry this instead of the full error so events stay
/// `Clone + PartialEq + Serialize` (permission denial is a plain `false`
/// return from the permission requests, so it has no kind here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedLocale,
    RecognizerUnavailable,
    SetupFailure,
    NotStarted,
    InvalidFormat,
    Backend,
}

pub type Result<T> = std::result::Result<T, TranscribeError>;
