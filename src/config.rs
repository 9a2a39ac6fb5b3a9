use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Normalized recognition locale tag ("en-US", "ms-MY", ...).
///
/// Language subtag is lowercased and the region subtag uppercased on
/// construction, so cache lookups and support checks agree no matter how
/// the caller spells the tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocaleId(String);

impl LocaleId {
    pub fn new(tag: impl AsRef<str>) -> Self {
        let mut parts = tag.as_ref().split('-');
        let mut normalized = match parts.next() {
            Some(language) => language.to_ascii_lowercase(),
            None => String::new(),
        };
        for part in parts {
            normalized.push('-');
            if part.len() == 2 {
                normalized.push_str(&part.to_ascii_uppercase());
            } else {
                normalized.push_str(part);
            }
        }
        LocaleId(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Primary language subtag ("en" for "en-US").
    pub fn language(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for LocaleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocaleId {
    fn from(tag: &str) -> Self {
        LocaleId::new(tag)
    }
}

/// Recognition session configuration.
///
/// Immutable for the lifetime of a session: the orchestrator tears down any
/// active session before applying a new config. Threshold fields are
/// sanitized by the `with_*` builders and by [`TranscriptionConfig::sanitized`];
/// deserialized configs go through `sanitized()` when they reach `setup()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Locale the recognizer transcribes in.
    pub locale: LocaleId,
    /// Report incremental (non-final) transcripts as they form.
    pub partial_results: bool,
    /// Forbid the backend from falling back to server-assisted recognition.
    pub on_device_only: bool,
    /// Autonomously stop the session on silence or max speech duration.
    pub end_of_utterance: bool,
    /// Silence duration after speech that ends the session, in seconds.
    pub end_of_utterance_timeout_secs: f32,
    /// Hard ceiling on total speaking time per session, in seconds.
    pub max_speech_secs: f32,
    /// VAD RMS threshold in [0, 1]; out-of-range values fall back to default.
    pub rms_threshold: f32,
    /// VAD decibel threshold (dBFS).
    pub db_threshold: f32,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            locale: LocaleId::new(defaults::LOCALE),
            partial_results: true,
            on_device_only: false,
            end_of_utterance: false,
            end_of_utterance_timeout_secs: defaults::END_OF_UTTERANCE_TIMEOUT_SECS,
            max_speech_secs: defaults::MAX_SPEECH_SECS,
            rms_threshold: defaults::RMS_THRESHOLD,
            db_threshold: defaults::DB_THRESHOLD,
        }
    }
}

impl TranscriptionConfig {
    pub fn new(locale: impl Into<LocaleId>) -> Self {
        Self {
            locale: locale.into(),
            ..Self::default()
        }
    }

    pub fn with_partial_results(mut self, enabled: bool) -> Self {
        self.partial_results = enabled;
        self
    }

    pub fn with_on_device_only(mut self, enabled: bool) -> Self {
        self.on_device_only = enabled;
        self
    }

    pub fn with_end_of_utterance(mut self, enabled: bool) -> Self {
        self.end_of_utterance = enabled;
        self
    }

    pub fn with_end_of_utterance_timeout(mut self, secs: f32) -> Self {
        self.end_of_utterance_timeout_secs = secs;
        self
    }

    pub fn with_max_speech(mut self, secs: f32) -> Self {
        self.max_speech_secs = secs;
        self
    }

    /// Sets the VAD RMS threshold, falling back to the default when the
    /// value is outside [0, 1].
    pub fn with_rms_threshold(mut self, threshold: f32) -> Self {
        self.rms_threshold = sanitize_rms(threshold);
        self
    }

    pub fn with_db_threshold(mut self, threshold: f32) -> Self {
        self.db_threshold = threshold;
        self
    }

    /// Returns a copy with out-of-range fields replaced by their defaults.
    ///
    /// Applied by the orchestrator at `setup()` so configs that bypassed the
    /// builders (struct literals, deserialized files) get the same treatment.
    pub fn sanitized(&self) -> Self {
        let mut config = self.clone();
        config.rms_threshold = sanitize_rms(config.rms_threshold);
        if !config.end_of_utterance_timeout_secs.is_finite()
            || config.end_of_utterance_timeout_secs <= 0.0
        {
            config.end_of_utterance_timeout_secs = defaults::END_OF_UTTERANCE_TIMEOUT_SECS;
        }
        if !config.max_speech_secs.is_finite() || config.max_speech_secs <= 0.0 {
            config.max_speech_secs = defaults::MAX_SPEECH_SECS;
        }
        config
    }

    pub fn end_of_utterance_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.end_of_utterance_timeout_secs)
    }

    pub fn max_speech_duration(&self) -> Duration {
        Duration::from_secs_f32(self.max_speech_secs)
    }

    /// Read a config from a TOML file, sanitizing thresholds on the way in.
    ///
    /// Fields absent from the file keep their defaults; malformed TOML is
    /// an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: TranscriptionConfig = toml::from_str(&contents)?;
        Ok(config.sanitized())
    }

    /// Fold environment overrides into the config:
    /// - PARLO_LOCALE → locale
    /// - PARLO_ON_DEVICE → on_device_only ("1"/"true")
    /// - PARLO_END_OF_UTTERANCE → end_of_utterance ("1"/"true")
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(locale) = std::env::var("PARLO_LOCALE")
            && !locale.is_empty()
        {
            self.locale = LocaleId::new(locale);
        }

        if let Ok(value) = std::env::var("PARLO_ON_DEVICE")
            && !value.is_empty()
        {
            self.on_device_only = matches!(value.as_str(), "1" | "true");
        }

        if let Ok(value) = std::env::var("PARLO_END_OF_UTTERANCE")
            && !value.is_empty()
        {
            self.end_of_utterance = matches!(value.as_str(), "1" | "true");
        }

        self
    }
}

fn sanitize_rms(threshold: f32) -> f32 {
    if (0.0..=1.0).contains(&threshold) {
        threshold
    } else {
        defaults::RMS_THRESHOLD
    }
}
