//! Closure-backed provider for tests and offline runs

use async_trait::async_trait;
use mosaic_core::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::provider::{InferenceProvider, InferenceRole};

type Responder = dyn Fn(&str, InferenceRole) -> Result<String> + Send + Sync;

/// Provider that answers with a closure and records every prompt
///
/// ```
/// use mosaic_agent::{FnProvider, InferenceProvider, InferenceRole};
///
/// # tokio_test_block(async {
/// let provider = FnProvider::new(|_, _| Ok("```rust\nfn one() -> u8 { 1 }\n```".to_string()));
/// let reply = provider.infer("anything", InferenceRole::Implementation).await.unwrap();
/// assert!(reply.contains("fn one"));
/// assert_eq!(provider.call_count(), 1);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct FnProvider {
    label: String,
    responder: Arc<Responder>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<(InferenceRole, String)>>>,
}

impl FnProvider {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, InferenceRole) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            label: "fn-provider".to_string(),
            responder: Arc::new(responder),
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Provider that always returns the same text
    pub fn fixed(response: impl Into<String>) -> Self {
        let response = response.into();
        Self::new(move |_, _| Ok(response.clone()))
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sleep before answering (for timeout and cancellation tests)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<(InferenceRole, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl std::fmt::Debug for FnProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnProvider")
            .field("label", &self.label)
            .field("delay", &self.delay)
            .finish()
    }
}

#[async_trait]
impl InferenceProvider for FnProvider {
    async fn infer(&self, prompt: &str, role: InferenceRole) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((role, prompt.to_string()));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(prompt, role)
    }

    fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::MosaicError;

    #[tokio::test]
    async fn test_records_prompts_in_order() {
        let provider = FnProvider::new(|prompt, role| Ok(format!("{}:{}", role, prompt.len())));
        provider.infer("abc", InferenceRole::Strategy).await.unwrap();
        let reply = provider
            .infer("abcdef", InferenceRole::Implementation)
            .await
            .unwrap();

        assert_eq!(reply, "implementation:6");
        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0], (InferenceRole::Strategy, "abc".to_string()));
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let provider =
            FnProvider::new(|_, _| Err(MosaicError::Inference("boom".to_string()))).with_label("broken");
        assert!(provider.infer("x", InferenceRole::Review).await.is_err());
        assert_eq!(provider.label(), "broken");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_call_log() {
        let provider = FnProvider::fixed("ok");
        let clone = provider.clone();
        clone.infer("x", InferenceRole::Planning).await.unwrap();
        assert_eq!(provider.call_count(), 1);
    }
}
