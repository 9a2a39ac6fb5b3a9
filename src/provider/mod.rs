//! Recognition backends behind one capability contract.
//!
//! The orchestrator drives a `Box<dyn RecognitionProvider>` and never learns
//! which engine sits behind it. Two engines ship: the legacy server-capable
//! recognizer (`legacy`) and the modern on-device streaming engine
//! (`ondevice`). The variant is chosen when the provider is constructed,
//! never per operation.

pub mod legacy;
pub mod ondevice;

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::audio::AudioFrame;
use crate::audio::frame::FrameFormat;
use crate::config::{LocaleId, TranscriptionConfig};
use crate::error::{ErrorKind, Result, TranscribeError};

pub use legacy::{LegacyProvider, MockRecognizerFactory, Recognizer, RecognizerFactory};
pub use ondevice::{MockStreamingEngine, OnDeviceProvider, StreamingEngine};

/// Events flowing from a recognition task back to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// Recognized text so far; `is_final` marks the single closing result
    Transcript { text: String, is_final: bool },
    /// The task failed and will produce nothing further
    Error { kind: ErrorKind, message: String },
}

impl RecognizerEvent {
    /// Build an error event carrying the error's kind and message.
    pub fn from_error(err: &TranscribeError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Per-task recognition options derived from the session config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecognitionOptions {
    /// Emit partial hypotheses while the utterance is still open
    pub partial_results: bool,
    /// Refuse server fallback even when the engine supports it
    pub on_device_only: bool,
}

impl RecognitionOptions {
    /// Extract the options a recognition task needs from the full config.
    pub fn from_config(config: &TranscriptionConfig) -> Self {
        Self {
            partial_results: config.partial_results,
            on_device_only: config.on_device_only,
        }
    }
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            partial_results: true,
            on_device_only: false,
        }
    }
}

/// A live streaming recognition task. Dropping it cancels the task.
///
/// Both engines hand their active task to the provider through this trait,
/// one stream per session.
pub trait RecognitionStream: Send {
    /// Feed one audio frame to the task.
    fn feed(&mut self, frame: &AudioFrame) -> Result<()>;

    /// Signal end-of-input so the task can deliver its final result.
    fn finish(&mut self) -> Result<()>;
}

/// Trait for speech recognition backends.
///
/// This trait allows swapping implementations (platform engines vs mock).
/// All methods are safe to call in any order; implementations report
/// misuse through `Result` instead of panicking.
#[async_trait]
pub trait RecognitionProvider: Send {
    /// Ask the host for speech recognition authorization.
    ///
    /// Suspends until the grant resolves. Idempotent; hosts typically
    /// answer from a cached decision after the first prompt.
    async fn request_permission(&mut self) -> bool;

    /// Validate and adopt a session configuration.
    ///
    /// Locale support is checked before any resource is allocated, so an
    /// unsupported locale leaves the provider exactly as it was. Calling
    /// again with a different locale must not leak the previous locale's
    /// resources.
    ///
    /// # Errors
    /// `UnsupportedLocale` or `RecognizerUnavailable`
    async fn configure(&mut self, config: &TranscriptionConfig) -> Result<()>;

    /// Begin a streaming recognition task.
    ///
    /// Transcripts and task errors flow through `events`. A prior active
    /// task is stopped first.
    ///
    /// # Errors
    /// `SetupFailure` if the task cannot start
    async fn start(&mut self, events: UnboundedSender<RecognizerEvent>) -> Result<()>;

    /// Feed one audio frame to the active task.
    ///
    /// The frame is converted to the engine's native format; if conversion
    /// fails the untouched frame is forwarded instead of being dropped.
    /// Must return quickly, it is called on the capture path.
    ///
    /// # Errors
    /// `NotStarted` when no task is active
    fn push_frame(&mut self, frame: &AudioFrame) -> Result<()>;

    /// Signal end-of-input and cancel the active task.
    ///
    /// Idempotent; a stop without an active task is Ok. Errors are
    /// reportable but teardown always completes.
    async fn stop(&mut self) -> Result<()>;

    /// Full teardown when the provider is being replaced or discarded.
    ///
    /// The on-device engine also releases its reserved locale assets here.
    async fn shutdown(&mut self) {
        if let Err(err) = self.stop().await {
            tracing::debug!(error = %err, "provider stop during shutdown failed");
        }
    }

    /// Locales this backend can recognize.
    fn supported_locales(&self) -> Vec<LocaleId>;
}

// Mock state stays inspectable even if an assertion panicked while a
// clone held the lock.
fn lock_state<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Default)]
struct MockProviderState {
    permission_granted: bool,
    fail_configure: bool,
    fail_start: bool,
    fail_stop: bool,
    supported: Vec<LocaleId>,
    configured: Option<TranscriptionConfig>,
    events: Option<UnboundedSender<RecognizerEvent>>,
    permission_calls: usize,
    configure_calls: usize,
    start_calls: usize,
    stop_calls: usize,
    pushed_frames: usize,
}

/// Mock recognition provider for testing.
///
/// Clones share state, so tests keep one handle for assertions and move
/// another into the orchestrator. Events are emitted manually through
/// [`MockProvider::emit`], standing in for the engine's callback thread.
#[derive(Debug, Clone)]
pub struct MockProvider {
    state: Arc<Mutex<MockProviderState>>,
}

impl MockProvider {
    /// Create a mock that grants permission and accepts every call.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockProviderState {
                permission_granted: true,
                supported: vec![LocaleId::from("en-US"), LocaleId::from("de-DE")],
                ..MockProviderState::default()
            })),
        }
    }

    /// Configure the mock to deny speech recognition permission
    pub fn with_permission_denied(self) -> Self {
        lock_state(&self.state).permission_granted = false;
        self
    }

    /// Configure the mock to fail configuration
    pub fn with_configure_failure(self) -> Self {
        lock_state(&self.state).fail_configure = true;
        self
    }

    /// Configure the mock to fail task start
    pub fn with_start_failure(self) -> Self {
        lock_state(&self.state).fail_start = true;
        self
    }

    /// Configure the mock to fail stop while still tearing down
    pub fn with_stop_failure(self) -> Self {
        lock_state(&self.state).fail_stop = true;
        self
    }

    /// Configure the locales the mock claims to support
    pub fn with_supported_locales(self, locales: Vec<LocaleId>) -> Self {
        lock_state(&self.state).supported = locales;
        self
    }

    /// Emit a recognizer event through the captured sender.
    ///
    /// Returns false when no task is active or the session side is gone.
    pub fn emit(&self, event: RecognizerEvent) -> bool {
        let state = lock_state(&self.state);
        match &state.events {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// True while a recognition task is active
    pub fn is_active(&self) -> bool {
        lock_state(&self.state).events.is_some()
    }

    /// Config adopted by the last successful `configure`
    pub fn configured(&self) -> Option<TranscriptionConfig> {
        lock_state(&self.state).configured.clone()
    }

    /// Number of permission requests observed
    pub fn permission_calls(&self) -> usize {
        lock_state(&self.state).permission_calls
    }

    /// Number of `configure` calls observed
    pub fn configure_calls(&self) -> usize {
        lock_state(&self.state).configure_calls
    }

    /// Number of `start` calls observed
    pub fn start_calls(&self) -> usize {
        lock_state(&self.state).start_calls
    }

    /// Number of `stop` calls observed
    pub fn stop_calls(&self) -> usize {
        lock_state(&self.state).stop_calls
    }

    /// Number of frames pushed to an active task
    pub fn pushed_frames(&self) -> usize {
        lock_state(&self.state).pushed_frames
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecognitionProvider for MockProvider {
    async fn request_permission(&mut self) -> bool {
        let mut state = lock_state(&self.state);
        state.permission_calls += 1;
        state.permission_granted
    }

    async fn configure(&mut self, config: &TranscriptionConfig) -> Result<()> {
        let mut state = lock_state(&self.state);
        state.configure_calls += 1;
        if state.fail_configure {
            return Err(TranscribeError::RecognizerUnavailable {
                message: "mock configure failure".to_string(),
            });
        }
        if !state.supported.contains(&config.locale) {
            return Err(TranscribeError::UnsupportedLocale {
                locale: config.locale.to_string(),
            });
        }
        state.configured = Some(config.clone());
        Ok(())
    }

    async fn start(&mut self, events: UnboundedSender<RecognizerEvent>) -> Result<()> {
        let mut state = lock_state(&self.state);
        state.start_calls += 1;
        if state.fail_start {
            return Err(TranscribeError::SetupFailure {
                message: "mock start failure".to_string(),
            });
        }
        state.events = Some(events);
        Ok(())
    }

    fn push_frame(&mut self, _frame: &AudioFrame) -> Result<()> {
        let mut state = lock_state(&self.state);
        if state.events.is_none() {
            return Err(TranscribeError::NotStarted);
        }
        state.pushed_frames += 1;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let mut state = lock_state(&self.state);
        state.stop_calls += 1;
        state.events = None;
        if state.fail_stop {
            return Err(TranscribeError::Backend {
                message: "mock stop failure".to_string(),
            });
        }
        Ok(())
    }

    fn supported_locales(&self) -> Vec<LocaleId> {
        lock_state(&self.state).supported.clone()
    }
}

#[derive(Debug, Default)]
struct MockStreamState {
    options: Option<RecognitionOptions>,
    fed: Vec<FrameFormat>,
    finished: bool,
    events: Option<UnboundedSender<RecognizerEvent>>,
}

/// Shared view into one mock recognition stream's observed traffic.
///
/// Both seam mocks ([`MockRecognizerFactory`] and [`MockStreamingEngine`])
/// hand these out so tests can watch what the provider fed the engine and
/// inject events as if the engine produced them.
#[derive(Debug, Clone, Default)]
pub struct MockStreamHandle {
    state: Arc<Mutex<MockStreamState>>,
}

impl MockStreamHandle {
    /// Open a mock stream, returning the inspection handle and the boxed
    /// stream the provider will own.
    pub(crate) fn open(
        options: RecognitionOptions,
        events: UnboundedSender<RecognizerEvent>,
        fail_finish: bool,
    ) -> (Self, Box<dyn RecognitionStream>) {
        let handle = Self::default();
        {
            let mut state = lock_state(&handle.state);
            state.options = Some(options);
            state.events = Some(events);
        }
        let stream = Box::new(MockStream {
            state: Arc::clone(&handle.state),
            fail_finish,
        });
        (handle, stream)
    }

    /// Number of frames the provider fed to this stream
    pub fn fed_frames(&self) -> usize {
        lock_state(&self.state).fed.len()
    }

    /// Formats of the frames fed, in order
    pub fn fed_formats(&self) -> Vec<FrameFormat> {
        lock_state(&self.state).fed.clone()
    }

    /// Whether end-of-input was signalled
    pub fn finished(&self) -> bool {
        lock_state(&self.state).finished
    }

    /// Options the stream was opened with
    pub fn options(&self) -> Option<RecognitionOptions> {
        lock_state(&self.state).options
    }

    /// Emit a recognizer event as if the engine produced it.
    pub fn emit(&self, event: RecognizerEvent) -> bool {
        let state = lock_state(&self.state);
        match &state.events {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

struct MockStream {
    state: Arc<Mutex<MockStreamState>>,
    fail_finish: bool,
}

impl RecognitionStream for MockStream {
    fn feed(&mut self, frame: &AudioFrame) -> Result<()> {
        lock_state(&self.state).fed.push(frame.format);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        lock_state(&self.state).finished = true;
        if self.fail_finish {
            return Err(TranscribeError::Backend {
                message: "mock finish failure".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn provider_contract_is_object_safe() {
        let _provider: Box<dyn RecognitionProvider> = Box::new(MockProvider::new());
    }

    #[tokio::test]
    async fn mock_rejects_unsupported_locale() {
        let mut provider = MockProvider::new();
        let config = TranscriptionConfig::new("xx-XX");

        let err = provider.configure(&config).await.unwrap_err();
        assert!(matches!(err, TranscribeError::UnsupportedLocale { .. }));
        assert!(provider.configured().is_none());
    }

    #[tokio::test]
    async fn mock_push_requires_active_task() {
        let mut provider = MockProvider::new();
        let frame = AudioFrame::from_f32(16000, 1, vec![0.0; 160]);

        let err = provider.push_frame(&frame).unwrap_err();
        assert!(matches!(err, TranscribeError::NotStarted));

        let (tx, _rx) = mpsc::unbounded_channel();
        provider.start(tx).await.unwrap();
        provider.push_frame(&frame).unwrap();
        assert_eq!(provider.pushed_frames(), 1);
    }

    #[tokio::test]
    async fn mock_emits_through_captured_sender() {
        let mut provider = MockProvider::new();
        let handle = provider.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();
        provider.start(tx).await.unwrap();

        assert!(handle.emit(RecognizerEvent::Transcript {
            text: "hello".to_string(),
            is_final: false,
        }));

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            RecognizerEvent::Transcript {
                text: "hello".to_string(),
                is_final: false,
            }
        );
    }

    #[tokio::test]
    async fn mock_stop_clears_active_task_even_on_failure() {
        let mut provider = MockProvider::new().with_stop_failure();
        let (tx, _rx) = mpsc::unbounded_channel();
        provider.start(tx).await.unwrap();
        assert!(provider.is_active());

        assert!(provider.stop().await.is_err());
        assert!(!provider.is_active());
    }

    #[tokio::test]
    async fn default_shutdown_stops_the_task() {
        let mut provider = MockProvider::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        provider.start(tx).await.unwrap();

        provider.shutdown().await;
        assert!(!provider.is_active());
        assert_eq!(provider.stop_calls(), 1);
    }

    #[test]
    fn options_derive_from_config() {
        let config = TranscriptionConfig::new("en-US")
            .with_partial_results(false)
            .with_on_device_only(true);
        let options = RecognitionOptions::from_config(&config);

        assert!(!options.partial_results);
        assert!(options.on_device_only);
    }

    #[test]
    fn recognizer_event_from_error_keeps_kind() {
        let err = TranscribeError::SetupFailure {
            message: "no audio route".to_string(),
        };
        let event = RecognizerEvent::from_error(&err);

        assert_eq!(
            event,
            RecognizerEvent::Error {
                kind: ErrorKind::SetupFailure,
                message: err.to_string(),
            }
        );
    }
}
