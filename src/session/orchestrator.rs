//! Session coordinator wiring audio capture to a recognition backend.
//!
//! One orchestrator owns at most one recording session. `start_recording`
//! spawns a session task that serializes the three concurrent inputs
//! (capture frames, recognizer events, the deadline ticker) through a single
//! `select!` loop, so state transitions never race. The capture side only
//! performs a channel send through [`FrameSink`] and cannot block on the
//! session.

use crate::audio::vad;
use crate::audio::{AudioFrame, MicrophonePermission, OpenMicrophone};
use crate::config::TranscriptionConfig;
use crate::defaults;
use crate::error::Result;
use crate::provider::{RecognitionProvider, RecognizerEvent};
use crate::session::events::TranscriptionEvent;
use crate::session::timeout::{Clock, SystemClock, UtteranceTimeouts};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type SharedProvider = Arc<tokio::sync::Mutex<Box<dyn RecognitionProvider>>>;
type FrameSlot = Arc<Mutex<Option<UnboundedSender<AudioFrame>>>>;

/// Lifecycle of the orchestrator's recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session; permissions and configuration may be (re)applied.
    Idle,
    /// Permission requests are in flight.
    Authorizing,
    /// A configuration is being validated by the provider.
    Configuring,
    /// Frames are flowing to an active recognition task.
    Listening,
    /// The session is tearing down its task and ticker.
    Finalizing,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SessionState::Authorizing,
            2 => SessionState::Configuring,
            3 => SessionState::Listening,
            4 => SessionState::Finalizing,
            _ => SessionState::Idle,
        }
    }
}

/// Session state shared between the orchestrator and its session task.
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn store(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Moves `from` to `to`; false when another transition won.
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

// A poisoned slot still holds a usable sender.
fn lock_slot(slot: &FrameSlot) -> MutexGuard<'_, Option<UnboundedSender<AudioFrame>>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn store_sink(slot: &FrameSlot, sender: Option<UnboundedSender<AudioFrame>>) {
    *lock_slot(slot) = sender;
}

/// Cloneable handle the audio capture callback pushes frames through.
///
/// `push` takes one uncontended mutex and performs an unbounded channel send,
/// so the capture thread never waits on session state. While no session is
/// listening, frames are dropped.
#[derive(Debug, Clone)]
pub struct FrameSink {
    slot: FrameSlot,
}

impl FrameSink {
    /// Enqueue one frame for the active session.
    ///
    /// Returns false when no session is listening; the frame is dropped.
    pub fn push(&self, frame: AudioFrame) -> bool {
        match lock_slot(&self.slot).as_ref() {
            Some(sender) => sender.send(frame).is_ok(),
            None => false,
        }
    }
}

/// Handle to a spawned session task.
struct Session {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Coordinates permissions, configuration, and recording sessions over one
/// recognition provider.
///
/// Events reach the caller through the receiver handed out by
/// [`SpeechToTextOrchestrator::take_events`]: interim and final transcripts,
/// one `AudioLevel` per pushed frame, and exactly one terminal event per
/// session (`Finished`, or `Error` when the recognition task itself failed).
pub struct SpeechToTextOrchestrator {
    provider: SharedProvider,
    microphone: Arc<dyn MicrophonePermission>,
    clock: Arc<dyn Clock>,
    state: Arc<StateCell>,
    authorized: bool,
    config: Option<TranscriptionConfig>,
    events: UnboundedSender<TranscriptionEvent>,
    events_rx: Option<UnboundedReceiver<TranscriptionEvent>>,
    frames: FrameSlot,
    session: Option<Session>,
}

impl SpeechToTextOrchestrator {
    /// Creates an orchestrator driving the given recognition backend.
    pub fn new(provider: Box<dyn RecognitionProvider>) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();
        Self {
            provider: Arc::new(tokio::sync::Mutex::new(provider)),
            microphone: Arc::new(OpenMicrophone),
            clock: Arc::new(SystemClock),
            state: Arc::new(StateCell::new(SessionState::Idle)),
            authorized: false,
            config: None,
            events,
            events_rx: Some(events_rx),
            frames: Arc::new(Mutex::new(None)),
            session: None,
        }
    }

    /// Sets a custom microphone permission collaborator.
    pub fn with_microphone(mut self, microphone: Arc<dyn MicrophonePermission>) -> Self {
        self.microphone = microphone;
        self
    }

    /// Sets a custom clock (for deterministic testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Hands out the event receiver; the stream has a single consumer.
    pub fn take_events(&mut self) -> Option<UnboundedReceiver<TranscriptionEvent>> {
        self.events_rx.take()
    }

    /// Returns the handle the capture collaborator pushes frames through.
    pub fn frame_sink(&self) -> FrameSink {
        FrameSink {
            slot: Arc::clone(&self.frames),
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state.load()
    }

    /// True while a recording session is accepting frames.
    pub fn is_listening(&self) -> bool {
        self.state.load() == SessionState::Listening
    }

    /// True once both permission collaborators have granted access.
    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    /// Requests microphone and speech recognition access.
    ///
    /// Both collaborators are always asked, so one denied prompt cannot mask
    /// the other. Returns true only when both grant; the result is stored
    /// and gates `start_recording`. Does not affect an active session.
    pub async fn request_permissions(&mut self) -> bool {
        let entered = self
            .state
            .transition(SessionState::Idle, SessionState::Authorizing);

        let microphone = self.microphone.request_access().await;
        let recognition = self.provider.lock().await.request_permission().await;

        if entered {
            self.state
                .transition(SessionState::Authorizing, SessionState::Idle);
        }

        self.authorized = microphone && recognition;
        if !self.authorized {
            debug!(microphone, recognition, "permission request denied");
        }
        self.authorized
    }

    /// Adopts a session configuration after the provider validates it.
    ///
    /// An active session is stopped first; the sanitized config applies to
    /// sessions started afterwards. On failure the previous configuration
    /// (if any) stays adopted and the state is Idle.
    ///
    /// # Errors
    /// `UnsupportedLocale` or `RecognizerUnavailable` from the provider
    pub async fn setup(&mut self, config: TranscriptionConfig) -> Result<()> {
        self.stop_recording().await;

        self.state.store(SessionState::Configuring);
        let config = config.sanitized();
        let result = self.provider.lock().await.configure(&config).await;
        self.state.store(SessionState::Idle);

        match result {
            Ok(()) => {
                debug!(
                    locale = %config.locale,
                    end_of_utterance = config.end_of_utterance,
                    "configuration adopted"
                );
                self.config = Some(config);
                Ok(())
            }
            Err(err) => {
                debug!(error = %err, "configuration rejected");
                Err(err)
            }
        }
    }

    /// Starts a recording session.
    ///
    /// No-op returning false unless permissions were granted and a
    /// configuration was adopted. A start failure emits an `Error` event and
    /// leaves nothing running. Returns true while listening.
    pub async fn start_recording(&mut self) -> bool {
        if !self.authorized {
            debug!("start_recording ignored: permissions not granted");
            return false;
        }
        let Some(config) = self.config.clone() else {
            debug!("start_recording ignored: no configuration adopted");
            return false;
        };
        if self.state.load() == SessionState::Listening {
            return true;
        }
        // Reap a session that stopped on its own so only one ever exists.
        self.stop_recording().await;

        let (recognizer_tx, recognizer_rx) = mpsc::unbounded_channel();
        if let Err(err) = self.provider.lock().await.start(recognizer_tx).await {
            warn!(error = %err, "recognition task failed to start");
            let _ = self.events.send(TranscriptionEvent::from_error(&err));
            return false;
        }

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = SessionTask {
            provider: Arc::clone(&self.provider),
            events: self.events.clone(),
            timeouts: UtteranceTimeouts::with_clock(
                config.end_of_utterance_timeout(),
                config.max_speech_duration(),
                Arc::clone(&self.clock),
            ),
            config,
            state: Arc::clone(&self.state),
            sink: Arc::clone(&self.frames),
        };

        store_sink(&self.frames, Some(frame_tx));
        self.state.store(SessionState::Listening);
        let handle = tokio::spawn(task.run(frame_rx, recognizer_rx, stop_rx));
        self.session = Some(Session {
            stop: stop_tx,
            task: handle,
        });
        debug!("recording session started");
        true
    }

    /// Stops when listening, starts otherwise. Returns true while listening.
    pub async fn toggle_recording(&mut self) -> bool {
        if self.state.load() == SessionState::Listening {
            self.stop_recording().await;
            false
        } else {
            self.start_recording().await
        }
    }

    /// Stops the active session and waits for its teardown to complete.
    ///
    /// Idempotent; a second call is a no-op. Teardown failures surface as
    /// `Error` events, never as a panic or a returned error, and the state
    /// always reaches Idle before this returns.
    pub async fn stop_recording(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        // Stop the capture feed first so no frame outlives the session.
        store_sink(&self.frames, None);
        let _ = session.stop.send(());
        if let Err(err) = session.task.await {
            warn!(error = %err, "session task aborted during teardown");
            self.state.store(SessionState::Idle);
            let _ = self.events.send(TranscriptionEvent::Finished);
        }
    }

    /// Tears down the session and releases backend resources.
    ///
    /// The on-device backend drops its locale reservation here, so a new
    /// configuration must be adopted before the next recording.
    pub async fn shutdown(&mut self) {
        self.stop_recording().await;
        self.provider.lock().await.shutdown().await;
        self.config = None;
    }
}

/// Per-session state owned by the spawned task.
struct SessionTask {
    provider: SharedProvider,
    events: UnboundedSender<TranscriptionEvent>,
    timeouts: UtteranceTimeouts<Arc<dyn Clock>>,
    config: TranscriptionConfig,
    state: Arc<StateCell>,
    sink: FrameSlot,
}

impl SessionTask {
    /// Serializes frames, recognizer events, deadline ticks, and the stop
    /// signal, then finalizes with exactly one terminal event.
    async fn run(
        mut self,
        mut frames: UnboundedReceiver<AudioFrame>,
        mut recognizer: UnboundedReceiver<RecognizerEvent>,
        mut stop: oneshot::Receiver<()>,
    ) {
        if self.config.end_of_utterance {
            self.timeouts.begin();
        }
        let mut ticker =
            tokio::time::interval(Duration::from_millis(defaults::TICK_INTERVAL_MS));

        // True when the terminal Error event is already on the stream.
        let error_is_terminal = loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => self.process_frame(&frame).await,
                    // Sink cleared; treated like an explicit stop.
                    None => break false,
                },
                event = recognizer.recv() => match event {
                    Some(RecognizerEvent::Transcript { text, is_final }) => {
                        let _ = self.events.send(TranscriptionEvent::Transcript { text });
                        if is_final {
                            debug!("recognizer delivered the final result");
                            break false;
                        }
                    }
                    Some(RecognizerEvent::Error { kind, message }) => {
                        warn!(?kind, error = %message, "recognition task failed");
                        let _ = self
                            .events
                            .send(TranscriptionEvent::Error { kind, message });
                        break true;
                    }
                    None => {
                        debug!("recognizer closed its event stream");
                        break false;
                    }
                },
                _ = ticker.tick(), if self.config.end_of_utterance => {
                    if let Some(reason) = self.timeouts.poll() {
                        debug!(?reason, "utterance deadline expired");
                        break false;
                    }
                }
                _ = &mut stop => break false,
            }
        };

        self.finalize(error_is_terminal).await;
    }

    async fn process_frame(&mut self, frame: &AudioFrame) {
        if let Err(err) = self.provider.lock().await.push_frame(frame) {
            debug!(error = %err, "frame not delivered to recognizer");
        }
        let _ = self.events.send(TranscriptionEvent::AudioLevel {
            level: vad::level(frame),
        });
        if self.config.end_of_utterance {
            self.timeouts.observe_voice(vad::has_voice(
                frame,
                self.config.rms_threshold,
                self.config.db_threshold,
            ));
        }
    }

    async fn finalize(self, error_is_terminal: bool) {
        self.state.store(SessionState::Finalizing);
        store_sink(&self.sink, None);

        if let Err(err) = self.provider.lock().await.stop().await {
            if error_is_terminal {
                debug!(error = %err, "provider stop after task failure also failed");
            } else {
                let _ = self.events.send(TranscriptionEvent::from_error(&err));
            }
        }

        self.state.store(SessionState::Idle);
        if !error_is_terminal {
            let _ = self.events.send(TranscriptionEvent::Finished);
        }
    }
}
