//! Modern on-device streaming engine.
//!
//! Locale models are downloadable assets with a reservation step: a locale
//! must be installed on the device and then reserved by this process before
//! the first recognition task. The provider holds one reservation at a
//! time, releasing the previous locale when the configuration switches and
//! releasing the last one on shutdown. Audio never leaves the device.

use std::collections::HashSet;
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

/// Trait for the on-device streaming engine binding.
///
/// This trait allows swapping implementations (platform engine vs mock).
#[async_trait]
pub trait StreamingEngine: Send + Sync {
    /// Ask the host for speech recognition authorization.
    ///
    /// Hosts prompt out of process, so the default resolves to granted.
    async fn request_permission(&self) -> bool {
        true
    }

    /// Locales the engine has models for.
    fn supported_locales(&self) -> Vec<LocaleId>;

    /// Whether the locale's model assets are installed on this device.
    async fn installed(&self, locale: &LocaleId) -> bool;

    /// Download and install the locale's model assets.
    ///
    /// # Errors
    /// `RecognizerUnavailable` when the assets cannot be fetched
    async fn install(&mut self, locale: &LocaleId) -> Result<()>;

    /// Reserve the installed locale for this process.
    ///
    /// # Errors
    /// `RecognizerUnavailable` when no reservation slot is free
    async fn reserve(&mut self, locale: &LocaleId) -> Result<()>;

    /// Release a reservation taken by [`StreamingEngine::reserve`].
    async fn release(&mut self, locale: &LocaleId);

    /// Open a streaming recognition task for a reserved locale.
    ///
    /// # Errors
    /// `SetupFailure` when the task cannot be opened
    fn begin_stream(
        &mut self,
        locale: &LocaleId,
        options: RecognitionOptions,
        events: UnboundedSender<RecognizerEvent>,
    ) -> Result<Box<dyn RecognitionStream>>;
}

/// On-device-only recognition engine with locale asset management.
pub struct OnDeviceProvider {
    engine: Box<dyn StreamingEngine>,
    config: Option<TranscriptionConfig>,
    reserved: Option<LocaleId>,
    active: Option<Box<dyn RecognitionStream>>,
}

impl OnDeviceProvider {
    /// Creates a provider driving the given engine binding.
    pub fn new(engine: Box<dyn StreamingEngine>) -> Self {
        Self {
            engine,
            config: None,
            reserved: None,
            active: None,
        }
    }
}

#[async_trait]
impl RecognitionProvider for OnDeviceProvider {
    async fn request_permission(&mut self) -> bool {
        self.engine.request_permission().await
    }

    async fn configure(&mut self, config: &TranscriptionConfig) -> Result<()> {
        // Support check precedes any asset work
        if !self.engine.supported_locales().contains(&config.locale) {
            return Err(TranscribeError::UnsupportedLocale {
                locale: config.locale.to_string(),
            });
        }

        if self.reserved.as_ref() != Some(&config.locale) {
            // Install the new locale before giving up the old reservation:
            // a failed download must leave the previous locale usable.
            if !self.engine.installed(&config.locale).await {
                debug!(locale = %config.locale, "installing locale assets");
                self.engine.install(&config.locale).await?;
            }
            if let Some(previous) = self.reserved.take() {
                self.engine.release(&previous).await;
            }
            self.engine.reserve(&config.locale).await?;
            self.reserved = Some(config.locale.clone());
        }

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

        let options = RecognitionOptions::from_config(&config);
        let stream = self.engine.begin_stream(&config.locale, options, events)?;
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

    async fn shutdown(&mut self) {
        if let Err(err) = self.stop().await {
            debug!(error = %err, "provider stop during shutdown failed");
        }
        if let Some(locale) = self.reserved.take() {
            self.engine.release(&locale).await;
        }
    }

    fn supported_locales(&self) -> Vec<LocaleId> {
        self.engine.supported_locales()
    }
}

#[derive(Debug)]
struct MockEngineState {
    permission_granted: bool,
    fail_install: bool,
    fail_reserve: bool,
    fail_begin: bool,
    fail_finish: bool,
    supported: Vec<LocaleId>,
    installed: HashSet<LocaleId>,
    reserved: Vec<LocaleId>,
    install_calls: Vec<LocaleId>,
    reserve_calls: Vec<LocaleId>,
    release_calls: Vec<LocaleId>,
    streams: Vec<MockStreamHandle>,
}

/// Mock streaming engine for testing
#[derive(Debug, Clone)]
pub struct MockStreamingEngine {
    state: Arc<Mutex<MockEngineState>>,
}

impl MockStreamingEngine {
    /// Create an engine supporting a few locales, none installed yet
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockEngineState {
                permission_granted: true,
                fail_install: false,
                fail_reserve: false,
                fail_begin: false,
                fail_finish: false,
                supported: vec![
                    LocaleId::from("en-US"),
                    LocaleId::from("de-DE"),
                    LocaleId::from("ms-MY"),
                ],
                installed: HashSet::new(),
                reserved: Vec::new(),
                install_calls: Vec::new(),
                reserve_calls: Vec::new(),
                release_calls: Vec::new(),
                streams: Vec::new(),
            })),
        }
    }

    /// Configure the locales the engine claims to support
    pub fn with_supported_locales(self, locales: Vec<LocaleId>) -> Self {
        lock_state(&self.state).supported = locales;
        self
    }

    /// Mark locales as already installed on the device
    pub fn with_installed(self, locales: Vec<LocaleId>) -> Self {
        lock_state(&self.state).installed = locales.into_iter().collect();
        self
    }

    /// Configure the engine to deny authorization
    pub fn with_permission_denied(self) -> Self {
        lock_state(&self.state).permission_granted = false;
        self
    }

    /// Configure asset installation to fail
    pub fn with_install_failure(self) -> Self {
        lock_state(&self.state).fail_install = true;
        self
    }

    /// Configure reservation to fail
    pub fn with_reserve_failure(self) -> Self {
        lock_state(&self.state).fail_reserve = true;
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

    /// Locales currently reserved, in reservation order
    pub fn reserved_locales(&self) -> Vec<LocaleId> {
        lock_state(&self.state).reserved.clone()
    }

    /// Locales passed to `install`, in call order
    pub fn install_calls(&self) -> Vec<LocaleId> {
        lock_state(&self.state).install_calls.clone()
    }

    /// Locales passed to `reserve`, in call order
    pub fn reserve_calls(&self) -> Vec<LocaleId> {
        lock_state(&self.state).reserve_calls.clone()
    }

    /// Locales passed to `release`, in call order
    pub fn release_calls(&self) -> Vec<LocaleId> {
        lock_state(&self.state).release_calls.clone()
    }

    /// Handle to the most recently opened stream
    pub fn last_stream(&self) -> Option<MockStreamHandle> {
        lock_state(&self.state).streams.last().cloned()
    }
}

impl Default for MockStreamingEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamingEngine for MockStreamingEngine {
    async fn request_permission(&self) -> bool {
        lock_state(&self.state).permission_granted
    }

    fn supported_locales(&self) -> Vec<LocaleId> {
        lock_state(&self.state).supported.clone()
    }

    async fn installed(&self, locale: &LocaleId) -> bool {
        lock_state(&self.state).installed.contains(locale)
    }

    async fn install(&mut self, locale: &LocaleId) -> Result<()> {
        let mut state = lock_state(&self.state);
        state.install_calls.push(locale.clone());
        if state.fail_install {
            return Err(TranscribeError::RecognizerUnavailable {
                message: format!("assets for {locale} could not be downloaded"),
            });
        }
        state.installed.insert(locale.clone());
        Ok(())
    }

    async fn reserve(&mut self, locale: &LocaleId) -> Result<()> {
        let mut state = lock_state(&self.state);
        state.reserve_calls.push(locale.clone());
        if state.fail_reserve {
            return Err(TranscribeError::RecognizerUnavailable {
                message: format!("no reservation slot for {locale}"),
            });
        }
        state.reserved.push(locale.clone());
        Ok(())
    }

    async fn release(&mut self, locale: &LocaleId) {
        let mut state = lock_state(&self.state);
        state.release_calls.push(locale.clone());
        state.reserved.retain(|reserved| reserved != locale);
    }

    fn begin_stream(
        &mut self,
        locale: &LocaleId,
        options: RecognitionOptions,
        events: UnboundedSender<RecognizerEvent>,
    ) -> Result<Box<dyn RecognitionStream>> {
        let mut state = lock_state(&self.state);
        if state.fail_begin {
            return Err(TranscribeError::SetupFailure {
                message: "mock stream failed to open".to_string(),
            });
        }
        if !state.reserved.contains(locale) {
            return Err(TranscribeError::SetupFailure {
                message: format!("locale {locale} is not reserved"),
            });
        }

        let (handle, stream) = MockStreamHandle::open(options, events, state.fail_finish);
        state.streams.push(handle);
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::FrameFormat;
    use tokio::sync::mpsc;

    fn provider_with(engine: &MockStreamingEngine) -> OnDeviceProvider {
        OnDeviceProvider::new(Box::new(engine.clone()))
    }

    #[tokio::test]
    async fn configure_installs_missing_assets_then_reserves() {
        let engine = MockStreamingEngine::new();
        let mut provider = provider_with(&engine);
        let en = LocaleId::from("en-US");

        provider.configure(&TranscriptionConfig::new("en-US")).await.unwrap();

        assert_eq!(engine.install_calls(), vec![en.clone()]);
        assert_eq!(engine.reserve_calls(), vec![en.clone()]);
        assert_eq!(engine.reserved_locales(), vec![en]);
    }

    #[tokio::test]
    async fn configure_skips_install_when_assets_present() {
        let engine = MockStreamingEngine::new().with_installed(vec![LocaleId::from("en-US")]);
        let mut provider = provider_with(&engine);

        provider.configure(&TranscriptionConfig::new("en-US")).await.unwrap();

        assert!(engine.install_calls().is_empty());
        assert_eq!(engine.reserve_calls(), vec![LocaleId::from("en-US")]);
    }

    #[tokio::test]
    async fn switching_locale_releases_previous_reservation() {
        let engine = MockStreamingEngine::new();
        let mut provider = provider_with(&engine);

        provider.configure(&TranscriptionConfig::new("en-US")).await.unwrap();
        provider.configure(&TranscriptionConfig::new("de-DE")).await.unwrap();

        assert_eq!(engine.release_calls(), vec![LocaleId::from("en-US")]);
        assert_eq!(engine.reserved_locales(), vec![LocaleId::from("de-DE")]);
    }

    #[tokio::test]
    async fn same_locale_reconfigure_skips_asset_flow() {
        let engine = MockStreamingEngine::new();
        let mut provider = provider_with(&engine);

        provider.configure(&TranscriptionConfig::new("en-US")).await.unwrap();
        provider
            .configure(&TranscriptionConfig::new("en-US").with_partial_results(false))
            .await
            .unwrap();

        assert_eq!(engine.install_calls().len(), 1);
        assert_eq!(engine.reserve_calls().len(), 1);
        assert!(engine.release_calls().is_empty());

        // The refreshed config still reaches the next task
        let (tx, _rx) = mpsc::unbounded_channel();
        provider.start(tx).await.unwrap();
        let options = engine.last_stream().unwrap().options().unwrap();
        assert!(!options.partial_results);
    }

    #[tokio::test]
    async fn unsupported_locale_rejected_before_any_asset_work() {
        let engine = MockStreamingEngine::new();
        let mut provider = provider_with(&engine);

        let err = provider
            .configure(&TranscriptionConfig::new("xx-XX"))
            .await
            .unwrap_err();

        assert!(matches!(err, TranscribeError::UnsupportedLocale { .. }));
        assert!(engine.install_calls().is_empty());
        assert!(engine.reserve_calls().is_empty());
    }

    #[tokio::test]
    async fn install_failure_keeps_previous_reservation() {
        let engine = MockStreamingEngine::new().with_installed(vec![LocaleId::from("en-US")]);
        let mut provider = provider_with(&engine);
        provider.configure(&TranscriptionConfig::new("en-US")).await.unwrap();

        engine.state.lock().unwrap().fail_install = true;
        let err = provider
            .configure(&TranscriptionConfig::new("de-DE"))
            .await
            .unwrap_err();

        assert!(matches!(err, TranscribeError::RecognizerUnavailable { .. }));
        assert!(engine.release_calls().is_empty(), "old reservation must survive");
        assert_eq!(engine.reserved_locales(), vec![LocaleId::from("en-US")]);
    }

    #[tokio::test]
    async fn reserve_failure_leaves_no_reservation() {
        let engine = MockStreamingEngine::new().with_reserve_failure();
        let mut provider = provider_with(&engine);

        let err = provider
            .configure(&TranscriptionConfig::new("en-US"))
            .await
            .unwrap_err();

        assert!(matches!(err, TranscribeError::RecognizerUnavailable { .. }));
        assert!(engine.reserved_locales().is_empty());
    }

    #[tokio::test]
    async fn shutdown_releases_reservation_and_finishes_stream() {
        let engine = MockStreamingEngine::new();
        let mut provider = provider_with(&engine);
        provider.configure(&TranscriptionConfig::new("en-US")).await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        provider.start(tx).await.unwrap();

        provider.shutdown().await;

        assert!(engine.last_stream().unwrap().finished());
        assert_eq!(engine.release_calls(), vec![LocaleId::from("en-US")]);
        assert!(engine.reserved_locales().is_empty());
    }

    #[tokio::test]
    async fn stop_keeps_the_reservation() {
        let engine = MockStreamingEngine::new();
        let mut provider = provider_with(&engine);
        provider.configure(&TranscriptionConfig::new("en-US")).await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        provider.start(tx).await.unwrap();

        provider.stop().await.unwrap();
        assert!(engine.last_stream().unwrap().finished());
        assert_eq!(engine.reserved_locales(), vec![LocaleId::from("en-US")]);

        provider.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_after_shutdown_fails_setup() {
        let engine = MockStreamingEngine::new();
        let mut provider = provider_with(&engine);
        provider.configure(&TranscriptionConfig::new("en-US")).await.unwrap();
        provider.shutdown().await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = provider.start(tx).await.unwrap_err();
        assert!(matches!(err, TranscribeError::SetupFailure { .. }));
    }

    #[tokio::test]
    async fn push_converts_to_native_format() {
        let engine = MockStreamingEngine::new();
        let mut provider = provider_with(&engine);
        provider.configure(&TranscriptionConfig::new("en-US")).await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        provider.start(tx).await.unwrap();

        let stereo = AudioFrame::from_i32(44100, 2, vec![1 << 20; 8820]);
        provider.push_frame(&stereo).unwrap();

        let formats = engine.last_stream().unwrap().fed_formats();
        assert_eq!(formats[0], FrameFormat::mono_f32(defaults::SAMPLE_RATE));
    }

    #[tokio::test]
    async fn push_without_start_is_not_started() {
        let engine = MockStreamingEngine::new();
        let mut provider = provider_with(&engine);

        let frame = AudioFrame::from_f32(16000, 1, vec![0.0; 160]);
        let err = provider.push_frame(&frame).unwrap_err();
        assert!(matches!(err, TranscribeError::NotStarted));
    }

    #[tokio::test]
    async fn permission_denial_passes_through() {
        let engine = MockStreamingEngine::new().with_permission_denied();
        let mut provider = provider_with(&engine);
        assert!(!provider.request_permission().await);
    }
}
