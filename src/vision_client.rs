use async_trait::async_trait;

use crate::error::CatalogError;
use crate::models::EnrichmentResult;

/// What an analysis request is for. The catalog only issues `Enrich` today;
/// the distinction exists so a future moderation-style prompt can reuse the
/// same client trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Enrich,
}

/// A backend capable of describing an image from sampled frames. Production
/// wiring points this at an external multimodal API; tests use the mock
/// below.
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn analyze(
        &self,
        frames: &[Vec<u8>],
        prompt: PromptKind,
    ) -> Result<EnrichmentResult, CatalogError>;
}

/// A `VisionClient` that always fails. Useful as a safe default when no real
/// backend is configured, so the worker exercises its retry/backoff path
/// instead of silently doing nothing.
pub struct NullVisionClient;

#[async_trait]
impl VisionClient for NullVisionClient {
    async fn analyze(
        &self,
        _frames: &[Vec<u8>],
        _prompt: PromptKind,
    ) -> Result<EnrichmentResult, CatalogError> {
        Err(CatalogError::ModelFailure(
            "no vision backend configured".to_string(),
        ))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails the first `fail_times` calls, then returns `result` on every
    /// subsequent call. Lets tests exercise the retry/backoff path before a
    /// task eventually succeeds.
    pub struct ScriptedVisionClient {
        fail_times: usize,
        calls: AtomicUsize,
        result: Mutex<EnrichmentResult>,
    }

    impl ScriptedVisionClient {
        pub fn new(fail_times: usize, result: EnrichmentResult) -> Self {
            ScriptedVisionClient {
                fail_times,
                calls: AtomicUsize::new(0),
                result: Mutex::new(result),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VisionClient for ScriptedVisionClient {
        async fn analyze(
            &self,
            _frames: &[Vec<u8>],
            _prompt: PromptKind,
        ) -> Result<EnrichmentResult, CatalogError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                return Err(CatalogError::ModelFailure("scripted failure".to_string()));
            }
            Ok(self.result.lock().unwrap().clone())
        }
    }
}
