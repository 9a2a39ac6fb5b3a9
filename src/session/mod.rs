//! Recording sessions: state machine, deadlines, caller-facing events.
//!
//! The orchestrator owns the session lifecycle; the timeout controller
//! watches the silence and max-speech deadlines; events carry everything the
//! caller observes.

pub mod events;
pub mod orchestrator;
pub mod timeout;

pub use events::TranscriptionEvent;
pub use orchestrator::{FrameSink, SessionState, SpeechToTextOrchestrator};
pub use timeout::{Clock, MockClock, StopReason, SystemClock, TimeoutState, UtteranceTimeouts};
