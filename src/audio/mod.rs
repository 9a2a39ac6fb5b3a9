//! Audio frames, voice detection, and capture-side permissions.
//!
//! Frames are immutable once built and share their payload across clones,
//! so fanning one frame out to the provider, the level meter, and voice
//! detection costs three pointer copies.

pub mod convert;
pub mod frame;
pub mod permission;
pub mod vad;

pub use frame::{AudioFrame, FrameFormat, SampleBuffer, SampleFormat};
pub use permission::{MicrophonePermission, MockMicrophone, OpenMicrophone};
