//! Voice activity detection over single audio frames.
//!
//! Pure functions only: the dual-timeout machinery that consumes these
//! signals lives in `session::timeout`. Detection combines an RMS energy
//! threshold with a decibel threshold by OR, so either signal alone marks a
//! frame as voiced. That deliberately over-detects speech, which keeps the
//! silence timeout from firing mid-utterance on soft trailing syllables.

use crate::audio::frame::{AudioFrame, SampleBuffer};
use crate::defaults;

/// Root-mean-square amplitude of a frame, in [0, 1] for in-range samples.
///
/// Computed over all channels and all samples. Integer samples are
/// normalized by their type's max magnitude before squaring, so a
/// full-scale i16 frame and a full-scale f32 frame report the same energy.
/// Runs in O(frame length) with no allocation.
pub fn rms(frame: &AudioFrame) -> f32 {
    let len = frame.len();
    if len == 0 {
        return 0.0;
    }

    let sum_squares: f64 = match frame.samples() {
        SampleBuffer::F32(samples) => samples.iter().map(|&s| (s as f64) * (s as f64)).sum(),
        SampleBuffer::I16(samples) => samples
            .iter()
            .map(|&s| {
                let normalized = s as f64 / i16::MAX as f64;
                normalized * normalized
            })
            .sum(),
        SampleBuffer::I32(samples) => samples
            .iter()
            .map(|&s| {
                let normalized = s as f64 / i32::MAX as f64;
                normalized * normalized
            })
            .sum(),
    };

    (sum_squares / len as f64).sqrt() as f32
}

/// Converts an RMS amplitude to dBFS.
///
/// The input is floored at `defaults::DB_FLOOR` so silence maps to a finite
/// -120 dBFS instead of -inf.
pub fn decibels(rms: f32) -> f32 {
    20.0 * rms.max(defaults::DB_FLOOR).log10()
}

/// True when the frame carries voice under either threshold.
///
/// `rms > rms_threshold || db > db_threshold`: the OR biases toward
/// over-detecting speech and under-triggering silence timeouts.
pub fn has_voice(frame: &AudioFrame, rms_threshold: f32, db_threshold: f32) -> bool {
    let energy = rms(frame);
    energy > rms_threshold || decibels(energy) > db_threshold
}

/// Normalized 0..1 level for UI meters, derived from the frame's RMS.
pub fn level(frame: &AudioFrame) -> f32 {
    rms(frame).clamp(0.0, 1.0)
}
