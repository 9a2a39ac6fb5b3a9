//! Dual-timeout tracking for autonomous end of utterance.
//!
//! Two clocks race while a session listens: a hard cap on total speaking
//! time and a rolling silence window that resets whenever voice is heard.
//! Whichever expires first stops the session. The controller emits at most
//! one stop signal per tracking period and disarms itself after firing.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for time operations, allowing mock time in tests.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// System clock reading through tokio's time source.
///
/// Under a paused test runtime `tokio::time::advance` moves this clock
/// together with the interval timers, so deadline tests are deterministic.
/// Outside a runtime it falls back to real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Implement Clock for Arc<C> to allow sharing one clock across components.
impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Tracking state of the timeout controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutState {
    /// Not watching any session.
    Inactive,
    /// Watching an active session for either deadline.
    Tracking,
}

/// Which deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Total speaking time hit the hard cap.
    MaxSpeech,
    /// No voice for the full end-of-utterance window.
    Silence,
}

/// Timeout state machine over {Inactive, Tracking}.
///
/// `begin()` arms both deadlines at recording start. Voice observations
/// feed `observe_voice`; a periodic `poll()` (100 ms cadence from the
/// session loop) checks the deadlines. The max-speech cap is checked
/// before the silence window, so when both have expired only
/// `StopReason::MaxSpeech` fires.
pub struct UtteranceTimeouts<C: Clock = SystemClock> {
    silence_timeout: Duration,
    max_speech: Duration,
    state: TimeoutState,
    recording_start: Option<Instant>,
    silence_start: Option<Instant>,
    clock: C,
}

impl<C: Clock> UtteranceTimeouts<C> {
    /// Creates a controller with the given deadlines and clock.
    pub fn with_clock(silence_timeout: Duration, max_speech: Duration, clock: C) -> Self {
        Self {
            silence_timeout,
            max_speech,
            state: TimeoutState::Inactive,
            recording_start: None,
            silence_start: None,
            clock,
        }
    }

    /// Starts tracking a new session.
    ///
    /// Records the recording start, arms the max-speech cap, and clears any
    /// silence window left over from a previous session.
    pub fn begin(&mut self) {
        self.state = TimeoutState::Tracking;
        self.recording_start = Some(self.clock.now());
        self.silence_start = None;
    }

    /// Stops tracking without firing.
    pub fn end(&mut self) {
        self.state = TimeoutState::Inactive;
        self.recording_start = None;
        self.silence_start = None;
    }

    /// Feeds one voice-activity observation.
    ///
    /// Voice clears the silence window. The first non-voiced observation
    /// after voice (or after `begin`) opens it; later non-voiced
    /// observations leave the existing window running.
    pub fn observe_voice(&mut self, voiced: bool) {
        if self.state != TimeoutState::Tracking {
            return;
        }

        if voiced {
            self.silence_start = None;
        } else if self.silence_start.is_none() {
            self.silence_start = Some(self.clock.now());
        }
    }

    /// Checks both deadlines, firing at most once per tracking period.
    ///
    /// Returns the expired deadline and disarms the controller, or `None`
    /// while both deadlines still have time left.
    pub fn poll(&mut self) -> Option<StopReason> {
        if self.state != TimeoutState::Tracking {
            return None;
        }
        let now = self.clock.now();

        // Max-duration takes precedence when both deadlines have expired
        if let Some(start) = self.recording_start
            && now.duration_since(start) >= self.max_speech
        {
            self.state = TimeoutState::Inactive;
            return Some(StopReason::MaxSpeech);
        }

        if let Some(start) = self.silence_start
            && now.duration_since(start) >= self.silence_timeout
        {
            self.state = TimeoutState::Inactive;
            return Some(StopReason::Silence);
        }

        None
    }

    /// Returns the current tracking state.
    pub fn state(&self) -> TimeoutState {
        self.state
    }

    /// Time left in the open silence window, if one is running.
    pub fn silence_remaining(&self) -> Option<Duration> {
        let start = self.silence_start?;
        Some(
            self.silence_timeout
                .saturating_sub(self.clock.now().duration_since(start)),
        )
    }

    /// Elapsed speaking time since `begin`, while tracking.
    pub fn speaking_elapsed(&self) -> Option<Duration> {
        let start = self.recording_start?;
        Some(self.clock.now().duration_since(start))
    }

    /// Time left before the max-speech cap fires.
    pub fn max_remaining(&self) -> Option<Duration> {
        let start = self.recording_start?;
        Some(
            self.max_speech
                .saturating_sub(self.clock.now().duration_since(start)),
        )
    }
}

impl UtteranceTimeouts<SystemClock> {
    /// Creates a controller with the given deadlines using the system clock.
    pub fn new(silence_timeout: Duration, max_speech: Duration) -> Self {
        Self::with_clock(silence_timeout, max_speech, SystemClock)
    }
}

/// Mock clock for testing that allows manual time advancement.
///
/// Clones share the same time source.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<std::sync::Mutex<Instant>>,
}

impl MockClock {
    /// Creates a new mock clock starting at the current instant.
    pub fn new() -> Self {
        Self {
            current: Arc::new(std::sync::Mutex::new(Instant::now())),
        }
    }

    /// Advances the mock clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        *self.lock() += duration;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Instant> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.lock()
    }
}
