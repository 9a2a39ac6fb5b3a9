//! parlo - Speech-to-text session orchestration.
//!
//! Drives streaming recognition backends behind one provider contract:
//! permissions, configuration, voice-activity detection, utterance deadlines,
//! and a single ordered event stream per recording session.

// Error handling discipline: library code propagates, never panics.
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod config;
pub mod defaults;
pub mod error;
pub mod provider;
pub mod session;

// Core surface (configure → record → observe events)
pub use config::{LocaleId, TranscriptionConfig};
pub use session::events::TranscriptionEvent;
pub use session::orchestrator::{FrameSink, SessionState, SpeechToTextOrchestrator};

// Backend contract (for embedders wiring their own engines)
pub use provider::{
    LegacyProvider, OnDeviceProvider, RecognitionOptions, RecognitionProvider, RecognitionStream,
    Recognizer, RecognizerEvent, RecognizerFactory, StreamingEngine,
};

// Audio surface
pub use audio::{
    AudioFrame, FrameFormat, MicrophonePermission, OpenMicrophone, SampleBuffer, SampleFormat,
};

// Error handling
pub use error::{ErrorKind, Result, TranscribeError};

/// Package version, suffixed with the short git hash when one was embedded
/// at build time (`"0.3.0+abc1234"`, plain `"0.3.0"` otherwise).
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{version}+{hash}"),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_leads_with_the_package_version() {
        assert!(version_string().starts_with(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn version_string_suffix_matches_the_embedded_hash() {
        let ver = version_string();
        match option_env!("GIT_HASH") {
            Some(hash) if !hash.is_empty() => {
                assert_eq!(ver.split('+').nth(1), Some(hash));
            }
            // Tarball builds carry no hash and no separator.
            _ => assert_eq!(ver, env!("CARGO_PKG_VERSION")),
        }
    }
}
