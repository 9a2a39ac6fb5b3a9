//! Events delivered to the session owner.
//!
//! Serializes as tagged JSON so callers on the other side of an IPC or FFI
//! boundary can consume the stream without sharing Rust types.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, TranscribeError};

/// Events emitted by a transcription session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptionEvent {
    /// Recognized text, cumulative for the current utterance
    Transcript { text: String },
    /// Input level in 0.0..=1.0, one per pushed frame
    AudioLevel { level: f32 },
    /// Recognition failed; the session stops after this event
    Error { kind: ErrorKind, message: String },
    /// The session reached Idle; no further events follow
    Finished,
}

impl TranscriptionEvent {
    /// Build an error event carrying the error's kind and message.
    pub fn from_error(err: &TranscribeError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Serialize event to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize event from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
