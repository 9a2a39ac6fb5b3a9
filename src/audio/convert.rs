//! Sample format conversion for recognition backends.
//!
//! Backends consume mono f32 at a fixed rate. Frames arriving from capture
//! can be any of the supported formats, so conversion mixes channels down by
//! averaging and resamples with linear interpolation. A frame that already
//! matches the target format passes through without touching the payload.

use crate::audio::frame::{AudioFrame, SampleBuffer, SampleFormat};
use crate::error::{Result, TranscribeError};

/// Mix a frame down to mono f32, normalizing integer samples to [-1, 1].
///
/// Channels are averaged per sampling instant, the same mix used for
/// multi-channel capture devices everywhere else in the crate.
pub fn to_mono_f32(frame: &AudioFrame) -> Result<Vec<f32>> {
    let channels = frame.format.channels as usize;
    if channels == 0 {
        return Err(TranscribeError::InvalidFormat {
            message: "frame declares zero channels".to_string(),
        });
    }

    let mono = match frame.samples() {
        SampleBuffer::F32(samples) => mix_channels(samples, channels, |s| s),
        SampleBuffer::I16(samples) => {
            mix_channels(samples, channels, |s| s as f32 / i16::MAX as f32)
        }
        SampleBuffer::I32(samples) => {
            mix_channels(samples, channels, |s| s as f32 / i32::MAX as f32)
        }
    };

    Ok(mono)
}

fn mix_channels<S: Copy>(samples: &[S], channels: usize, normalize: impl Fn(S) -> f32) -> Vec<f32> {
    if channels == 1 {
        return samples.iter().map(|&s| normalize(s)).collect();
    }

    samples
        .chunks_exact(channels)
        .map(|instant| {
            let sum: f32 = instant.iter().map(|&s| normalize(s)).sum();
            sum / channels as f32
        })
        .collect()
}

/// Simple linear interpolation resampling.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                // Rounding can land the last position on the final sample.
                samples[samples.len() - 1]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as f32
            }
        })
        .collect()
}

/// Convert a frame to mono f32 at `target_rate`.
///
/// Frames already in the target format are returned as a payload-sharing
/// clone. Zero-rate and zero-channel frames are rejected before any work.
pub fn for_backend(frame: &AudioFrame, target_rate: u32) -> Result<AudioFrame> {
    if frame.format.sample_rate == 0 || target_rate == 0 {
        return Err(TranscribeError::InvalidFormat {
            message: format!(
                "cannot resample {} Hz to {} Hz",
                frame.format.sample_rate, target_rate
            ),
        });
    }

    if frame.format.channels == 1
        && frame.format.sample_format == SampleFormat::F32
        && frame.format.sample_rate == target_rate
    {
        return Ok(frame.clone());
    }

    let mono = to_mono_f32(frame)?;
    let resampled = resample_linear(&mono, frame.format.sample_rate, target_rate);
    Ok(AudioFrame::from_f32(target_rate, 1, resampled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_format_shares_payload() {
        let frame = AudioFrame::from_f32(16000, 1, vec![0.5f32; 160]);
        let converted = for_backend(&frame, 16000).unwrap();

        let (SampleBuffer::F32(before), SampleBuffer::F32(after)) =
            (frame.samples(), converted.samples())
        else {
            panic!("expected f32 buffers");
        };
        assert!(std::sync::Arc::ptr_eq(before, after));
    }

    #[test]
    fn stereo_downmix_handles_negative_values() {
        // Stereo pairs with cancelling values: (-0.5, 0.5), (0.25, -0.25)
        let frame = AudioFrame::from_f32(16000, 2, vec![-0.5, 0.5, 0.25, -0.25]);
        let mono = to_mono_f32(&frame).unwrap();

        assert_eq!(mono, vec![0.0, 0.0]);
    }

    #[test]
    fn i16_samples_normalize_to_unit_range() {
        let frame = AudioFrame::from_i16(16000, 1, vec![i16::MAX, 0, i16::MAX / 2]);
        let mono = to_mono_f32(&frame).unwrap();

        assert!((mono[0] - 1.0).abs() < 0.001);
        assert_eq!(mono[1], 0.0);
        assert!((mono[2] - 0.5).abs() < 0.001);
    }

    #[test]
    fn i32_samples_normalize_to_unit_range() {
        let frame = AudioFrame::from_i32(16000, 1, vec![i32::MAX, i32::MIN / 2]);
        let mono = to_mono_f32(&frame).unwrap();

        assert!((mono[0] - 1.0).abs() < 0.001);
        assert!((mono[1] + 0.5).abs() < 0.001);
    }

    #[test]
    fn resample_identity_same_rate() {
        let samples = vec![0.1f32, 0.2, 0.3, 0.4, 0.5];
        let resampled = resample_linear(&samples, 16000, 16000);

        assert_eq!(resampled, samples);
    }

    #[test]
    fn resample_upsample_verification() {
        let samples = vec![0.0f32, 0.1, 0.2];
        let resampled = resample_linear(&samples, 8000, 16000);

        // Upsampling from 8kHz to 16kHz should double the sample count
        assert_eq!(resampled.len(), 6);

        // Values should be interpolated
        assert_eq!(resampled[0], 0.0);
        assert!(resampled[1] > 0.0 && resampled[1] < 0.1);
        assert!((resampled[2] - 0.1).abs() < 0.0001);
    }

    #[test]
    fn resample_downsample_verification() {
        let samples = vec![0.0f32; 3200]; // 200ms at 16kHz
        let resampled = resample_linear(&samples, 16000, 8000);

        // Downsampling from 16kHz to 8kHz should halve the sample count
        assert_eq!(resampled.len(), 1600);
    }

    #[test]
    fn resample_preserves_signal_amplitude() {
        let samples = vec![0.25f32; 100];
        let resampled = resample_linear(&samples, 16000, 8000);

        assert!(resampled.iter().all(|&s| (s - 0.25).abs() < 0.001));
    }

    #[test]
    fn resample_handles_edge_cases() {
        // Empty input
        let empty = resample_linear(&[], 16000, 8000);
        assert_eq!(empty.len(), 0);

        // Single sample
        let single = resample_linear(&[0.5f32], 16000, 8000);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0], 0.5);
    }

    #[test]
    fn zero_channels_is_rejected() {
        let frame = AudioFrame::from_f32(16000, 0, vec![0.0f32; 16]);
        let err = to_mono_f32(&frame).unwrap_err();

        assert!(matches!(err, TranscribeError::InvalidFormat { .. }));
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let frame = AudioFrame::from_f32(0, 1, vec![0.0f32; 16]);
        let err = for_backend(&frame, 16000).unwrap_err();

        assert!(matches!(err, TranscribeError::InvalidFormat { .. }));
    }

    #[test]
    fn stereo_i16_converts_end_to_end() {
        // 48kHz stereo i16 down to 16kHz mono f32: a typical capture config
        let samples = vec![1000i16; 9600]; // 100ms at 48kHz stereo
        let frame = AudioFrame::from_i16(48000, 2, samples);
        let converted = for_backend(&frame, 16000).unwrap();

        assert_eq!(converted.format.sample_rate, 16000);
        assert_eq!(converted.format.channels, 1);
        assert_eq!(converted.len(), 1600);
        let expected = 1000.0 / i16::MAX as f32;
        let SampleBuffer::F32(out) = converted.samples() else {
            panic!("expected f32 buffer");
        };
        assert!(out.iter().all(|&s| (s - expected).abs() < 0.001));
    }
}
