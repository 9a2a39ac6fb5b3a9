//! Immutable PCM audio frames as delivered by capture callbacks.

use std::sync::Arc;
use std::time::Duration;

/// Sample representation of a frame's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// 32-bit float in [-1, 1].
    F32,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
}

/// Describes the layout of one frame: rate, channel count, representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl FrameFormat {
    pub fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    /// Mono float format, the native input of every streaming recognizer
    /// this crate drives.
    pub fn mono_f32(sample_rate: u32) -> Self {
        Self::new(sample_rate, 1, SampleFormat::F32)
    }
}

/// Interleaved sample payload, shared and immutable.
#[derive(Debug, Clone)]
pub enum SampleBuffer {
    F32(Arc<[f32]>),
    I16(Arc<[i16]>),
    I32(Arc<[i32]>),
}

impl SampleBuffer {
    /// Total sample count across all channels.
    pub fn len(&self) -> usize {
        match self {
            SampleBuffer::F32(samples) => samples.len(),
            SampleBuffer::I16(samples) => samples.len(),
            SampleBuffer::I32(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One chunk of captured audio plus its format.
///
/// Created once per hardware callback and never mutated afterwards; the
/// payload sits behind an `Arc` so handing a frame to the recognizer and to
/// the level meter costs a pointer copy, not a buffer copy. Frames are
/// processed in place and not retained past the callback that delivered them.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub format: FrameFormat,
    samples: SampleBuffer,
}

impl AudioFrame {
    pub fn from_f32(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            format: FrameFormat::new(sample_rate, channels, SampleFormat::F32),
            samples: SampleBuffer::F32(samples.into()),
        }
    }

    pub fn from_i16(sample_rate: u32, channels: u16, samples: Vec<i16>) -> Self {
        Self {
            format: FrameFormat::new(sample_rate, channels, SampleFormat::I16),
            samples: SampleBuffer::I16(samples.into()),
        }
    }

    pub fn from_i32(sample_rate: u32, channels: u16, samples: Vec<i32>) -> Self {
        Self {
            format: FrameFormat::new(sample_rate, channels, SampleFormat::I32),
            samples: SampleBuffer::I32(samples.into()),
        }
    }

    pub fn samples(&self) -> &SampleBuffer {
        &self.samples
    }

    /// Total sample count across all channels.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Frames per channel (total samples divided by channel count).
    pub fn frames_per_channel(&self) -> usize {
        if self.format.channels == 0 {
            return 0;
        }
        self.len() / self.format.channels as usize
    }

    /// Wall-clock duration of this frame's audio.
    pub fn duration(&self) -> Duration {
        if self.format.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(
            self.frames_per_channel() as f64 / self.format.sample_rate as f64,
        )
    }
}
