//! Microphone access permission.
//!
//! Recognition itself carries a second permission, owned by the provider.
//! Both must be granted before a session can start.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

/// Trait for microphone permission prompts.
///
/// This trait allows swapping implementations (host permission service vs
/// mock). A denial is an ordinary `false`, not an error.
#[async_trait]
pub trait MicrophonePermission: Send + Sync {
    /// Ask the host for microphone access.
    ///
    /// # Returns
    /// true if access was granted
    async fn request_access(&self) -> bool;
}

/// Host microphone permission.
///
/// Prompting happens out of process on every platform this crate targets,
/// so the request resolves to granted and capture errors surface later as
/// provider failures if access was actually revoked.
#[derive(Debug, Default)]
pub struct OpenMicrophone;

#[async_trait]
impl MicrophonePermission for OpenMicrophone {
    async fn request_access(&self) -> bool {
        true
    }
}

/// Mock microphone permission for testing
#[derive(Debug, Clone)]
pub struct MockMicrophone {
    granted: bool,
    requests: Arc<AtomicUsize>,
}

impl MockMicrophone {
    /// Create a mock that grants access
    pub fn new() -> Self {
        Self {
            granted: true,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to deny access
    pub fn with_denied(mut self) -> Self {
        self.granted = false;
        self
    }

    /// Number of times access was requested
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Default for MockMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MicrophonePermission for MockMicrophone {
    async fn request_access(&self) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_microphone_grants_access() {
        assert!(OpenMicrophone.request_access().await);
    }

    #[tokio::test]
    async fn mock_denies_when_configured() {
        let mic = MockMicrophone::new().with_denied();
        assert!(!mic.request_access().await);
    }

    #[tokio::test]
    async fn mock_counts_requests_across_clones() {
        let mic = MockMicrophone::new();
        let shared = mic.clone();

        shared.request_access().await;
        shared.request_access().await;

        assert_eq!(mic.request_count(), 2);
    }
}
