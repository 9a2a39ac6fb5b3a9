//! Default configuration constants for parlo.
//!
//! This module provides shared constants used across different configuration
//! types to ensure consistency and eliminate duplication.

/// Default recognition locale tag.
///
/// "en-US" is the one locale every known recognition backend ships with,
/// so it is the safest fallback for unconfigured sessions.
pub const LOCALE: &str = "en-US";

/// Default Voice Activity Detection (VAD) RMS threshold.
///
/// RMS of normalized samples (0.0 to 1.0). 0.0035 is tuned for typical
/// built-in microphone levels: low enough to catch soft speech onsets while
/// staying above electrical noise floors.
pub const RMS_THRESHOLD: f32 = 0.0035;

/// Default Voice Activity Detection decibel threshold (dBFS).
///
/// -52 dBFS sits well below conversational speech (-30 to -10 dBFS) and
/// above ambient room noise on most hardware. Combined with the RMS
/// threshold by OR, so either signal alone marks a frame as voiced.
pub const DB_THRESHOLD: f32 = -52.0;

/// Default end-of-utterance silence timeout in seconds.
///
/// 3 seconds of continuous silence after speech ends the session. Long
/// enough for natural mid-sentence pauses, short enough that a finished
/// speaker is not left waiting.
pub const END_OF_UTTERANCE_TIMEOUT_SECS: f32 = 3.0;

/// Default maximum speech duration in seconds.
///
/// Hard ceiling on total session length regardless of continued voice
/// activity. Keeps runaway sessions (background chatter, TV audio) from
/// streaming to the recognizer indefinitely.
pub const MAX_SPEECH_SECS: f32 = 8.0;

/// Timeout ticker cadence in milliseconds.
///
/// The utterance timeouts are re-evaluated on this fixed interval, so a
/// timeout fires within one tick of its true deadline. 100ms is coarse
/// enough to be cheap and fine enough to be imperceptible.
pub const TICK_INTERVAL_MS: u64 = 100;

/// Floor applied to RMS before the log10 conversion to decibels.
///
/// Keeps `20 * log10(rms)` finite on all-zero frames: 1e-6 maps silence
/// to -120 dBFS instead of -inf.
pub const DB_FLOOR: f32 = 1e-6;

/// Maximum number of per-locale recognizer instances the legacy backend
/// keeps alive.
///
/// Recognizer construction is the expensive step for the server-capable
/// engine, so instances are reused across sessions. The cache evicts in
/// insertion order once this many locales have been configured.
pub const RECOGNIZER_CACHE_CAP: usize = 8;

/// Reference capture buffer size in samples per frame.
///
/// Hardware callbacks deliver 1024-4096 samples per buffer on common
/// platforms; tests and benchmarks use this size for representative frames.
pub const FRAME_SAMPLES: usize = 4096;

/// Native sample rate both recognition engines consume, in Hz.
///
/// Frames arriving in other formats are converted on the push path.
pub const SAMPLE_RATE: u32 = 16_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_threshold_is_within_valid_range() {
        assert!(RMS_THRESHOLD > 0.0 && RMS_THRESHOLD <= 1.0);
    }

    #[test]
    fn db_floor_maps_silence_to_finite_level() {
        let db = 20.0 * DB_FLOOR.log10();
        assert!(db.is_finite());
        assert_eq!(db, -120.0);
    }
}
