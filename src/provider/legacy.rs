//! Legacy server-capable recognition engine.
//!
//! Recognizer construction is the expensive step for this engine, so one
//! recognizer per locale is cached and reused across sessions, bounded by
//! `defaults::RECOGNIZER_CACHE_CAP` with insertion-order eviction. The
//! platform binding sits behind the `RecognizerFactory` / `Recognizer` /
//! `RecognitionStream` seam; this crate ships mocks for all three.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use crate::audio::{AudioFrame, convert};
use crate::config::{LocaleId, TranscriptionConfig};
use crate::defaults;
use crate::error::{Result, TranscribeError};
use crate::provider::{
    MockStreamHandle, RecognitionOptions, RecognitionProvider, RecognitionStream, RecognizerEvent,
    lock_state,
};

/// Trait for platform bindings that construct per-locale recognizers.
///
/// This trait allows swapping implementations (platform engine vs mock).
#[async_trait]
pub trait RecognizerFactory: Send + Sync {
    /// Ask the host for speech recognition authorization.
    ///
    /// Hosts prompt out of process, so the default resolves to granted and
    /// revocation surfaces later as recognizer failures.
    async fn request_permission(&self) -> bool {
        true
    }

    /// Locales the engine can recognize.
    fn supported_locales(&self) -> Vec<LocaleId>;

    /// Construct a recognizer bound to one locale.
    ///
    /// # Errors
    /// `RecognizerUnavailable` when the engine cannot serve the locale
    fn create(&self, locale: &LocaleId) -> Result<Box<dyn Recognizer>>;
}

/// A per-locale recognizer handle, cached and reused across sessions.
pub trait Recognizer: Send {
    /// Open a streaming recognition task.
    ///
    /// # Errors
    /// `SetupFailure` when the task cannot be opened
    fn begin_stream(
        &mut self,
        options: RecognitionOptions,
        events: UnboundedSender<RecognizerEvent>,
    ) -> Result<Box<dyn RecognitionStream>>;
}

/// Server-capable recognition engine with per-locale recognizer reuse.
pub struct LegacyProvider {
    factory: Box<dyn RecognizerFactory>,
    cache: Vec<(LocaleId, Box<dyn Recognizer>)>,
    config: Option<TranscriptionConfig>,
    active: Option<Box<dyn RecognitionStream>>,
}

impl LegacyProvider {
    /// Creates a provider driving recognizers built by `factory`.
    pub fn new(factory: Box<dyn RecognizerFactory>) -> Self {
        Self {
            factory,
            cache: Vec::new(),
            config: None,
            active: None,
        }
    }

    /// Index of the cached recognizer for `locale`, creating it on a miss.
    fn ensure_recognizer(&mut self, locale: &LocaleId) -> Result<usize> {
        if let Some(idx) = self.cache.iter().position(|(cached, _)| cached == locale) {
            return Ok(idx);
        }

        let recognizer = self.factory.create(locale)?;
        if self.cache.len() >= defaults::RECOGNIZER_CACHE_CAP {
            let (evicted, _) = self.cache.remove(0);
            debug!(locale = %evicted, "evicting cached recognizer");
        }
        self.cache.push((locale.clone(), recognizer));
        Ok(self.cache.len() - 1)
    }
}

#[async_trait]
impl RecognitionProvider for LegacyProvider {
    async fn request_permission(&mut self) -> bool {
        self.factory.request_permission().await
    }

    async fn configure(&mut self, config: &TranscriptionConfig) -> Result<()> {
        // Support check precedes allocation: a rejected locale must leave
        // the provider exactly as it was.
        if !self.factory.supported_locales().contains(&config.locale) {
            return Err(TranscribeError::UnsupportedLocale {
                locale: config.locale.to_string(),
            });
        }

        self.ensure_recognizer(&config.locale)?;
        self.config = Some(config.clone());
        Ok(())
    }

    async fn start(&mut self, events: UnboundedSender<RecognizerEvent>) -> Result<()> {
        let config = self
            .config
            .clone()
            .ok_or_else(|| TranscribeError::SetupFailure {
                message: "start called before configure".to_string(),
            })?;

        if let Some(mut prior) = self.active.take()
            && let Err(err) = prior.finish()
        {
            debug!(error = %err, "prior recognition task failed to finish");
        }

        let idx = self
            .ensure_recognizer(&config.locale)
            .map_err(|err| TranscribeError::SetupFailure {
                message: err.to_string(),
            })?;
        let options = RecognitionOptions::from_config(&config);
        let stream = self.cache[idx].1.begin_stream(options, events)?;
        self.active = Some(stream);
        Ok(())
    }

    fn push_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        let Some(stream) = self.active.as_mut() else {
            return Err(TranscribeError::NotStarted);
        };

        match convert::for_backend(frame, defaults::SAMPLE_RATE) {
            Ok(converted) => stream.feed(&converted),
            Err(err) => {
                // The engine may still salvage an odd format; a gap in the
                // audio is never recoverable.
                trace!(error = %err, "forwarding frame unconverted");
                stream.feed(frame)
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(mut stream) = self.active.take() else {
            return Ok(());
        };
        stream.finish()
    }

    fn supported_locales(&self) -> Vec<LocaleId> {
        self.factory.supported_locales()
    }
}

#[derive(Debug)]
struct MockFactoryState {
    permission_granted: bool,
    fail_create: bool,
    fail_begin: bool,
    fail_finish: bool,
    supported: Vec<LocaleId>,
    created: Vec<LocaleId>,
    streams: Vec<MockStreamHandle>,
}

/// Mock recognizer factory for testing
#[derive(Debug, Clone)]
pub struct MockRecognizerFactory {
    state: Arc<Mutex<MockFactoryState>>,
}

impl MockRecognizerFactory {
    /// Create a factory supporting a few common locales
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockFactoryState {
                permission_granted: true,
                fail_create: false,
                fail_begin: false,
                fail_finish: false,
                supported: vec![
                    LocaleId::from("en-US"),
                    LocaleId::from("de-DE"),
                    LocaleId::from("ms-MY"),
                ],
                created: Vec::new(),
                streams: Vec::new(),
            })),
        }
    }

    /// Configure the locales the factory claims to support
    pub fn with_supported_locales(self, locales: Vec<LocaleId>) -> Self {
        lock_state(&self.state).supported = locales;
        self
    }

    /// Configure the factory to deny authorization
    pub fn with_permission_denied(self) -> Self {
        lock_state(&self.state).permission_granted = false;
        self
    }

    /// Configure recognizer construction to fail
    pub fn with_create_failure(self) -> Self {
        lock_state(&self.state).fail_create = true;
        self
    }

    /// Configure stream opening to fail
    pub fn with_begin_failure(self) -> Self {
        lock_state(&self.state).fail_begin = true;
        self
    }

    /// Configure end-of-input signalling to fail
    pub fn with_finish_failure(self) -> Self {
        lock_state(&self.state).fail_finish = true;
        self
    }

    /// Locales passed to `create`, in call order
    pub fn created_locales(&self) -> Vec<LocaleId> {
        lock_state(&self.state).created.clone()
    }

    /// Number of `create` calls for one locale
    pub fn create_count(&self, locale: &LocaleId) -> usize {
        lock_state(&self.state)
            .created
            .iter()
            .filter(|created| *created == locale)
            .count()
    }

    /// Handles to every stream opened so far, in order
    pub fn streams(&self) -> Vec<MockStreamHandle> {
        lock_state(&self.state).streams.clone()
    }

    /// Handle to the most recently opened stream
    pub fn last_stream(&self) -> Option<MockStreamHandle> {
        lock_state(&self.state).streams.last().cloned()
    }
}

impl Default for MockRecognizerFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecognizerFactory for MockRecognizerFactory {
    async fn request_permission(&self) -> bool {
        lock_state(&self.state).permission_granted
    }

    fn supported_locales(&self) -> Vec<LocaleId> {
        lock_state(&self.state).supported.clone()
    }

    fn create(&self, locale: &LocaleId) -> Result<Box<dyn Recognizer>> {
        let mut state = lock_state(&self.state);
        if state.fail_create {
            return Err(TranscribeError::RecognizerUnavailable {
                message: format!("no recognizer available for {locale}"),
            });
        }
        state.created.push(locale.clone());
        Ok(Box::new(MockRecognizer {
            shared: Arc::clone(&self.state),
        }))
    }
}

struct MockRecognizer {
    shared: Arc<Mutex<MockFactoryState>>,
}

impl Recognizer for MockRecognizer {
    fn begin_stream(
        &mut self,
        options: RecognitionOptions,
        events: UnboundedSender<RecognizerEvent>,
    ) -> Result<Box<dyn RecognitionStream>> {
        let mut shared = lock_state(&self.shared);
        if shared.fail_begin {
            return Err(TranscribeError::SetupFailure {
                message: "mock stream failed to open".to_string(),
            });
        }

        let (handle, stream) = MockStreamHandle::open(options, events, shared.fail_finish);
        shared.streams.push(handle);
        Ok(stream)
    }
}
