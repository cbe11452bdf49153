//! Anthropic messages API provider
//!
//! Each call is a single stateless message. Rate limits (429) and server
//! errors (5xx) are retried with exponential backoff; other failures count
//! against a circuit breaker shared by every provider in the process.

use async_trait::async_trait;
use mosaic_core::config::ModelConfig;
use mosaic_core::{MosaicError, Result, Tier};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::auth;
use crate::circuit_breaker::CircuitBreaker;
use crate::provider::{InferenceProvider, InferenceRole};
use crate::types::{AnthropicMessage, AnthropicRequest, AnthropicResponse};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: usize = 4096;

const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_SECS: u64 = 10;
const MAX_BACKOFF_SECS: u64 = 300;

static CIRCUIT_BREAKER: OnceLock<Arc<CircuitBreaker>> = OnceLock::new();

/// Process-wide breaker used by providers built with [`AnthropicProvider::new`]
pub fn shared_circuit_breaker() -> Arc<CircuitBreaker> {
    CIRCUIT_BREAKER
        .get_or_init(|| Arc::new(CircuitBreaker::default()))
        .clone()
}

/// Provider backed by one Anthropic model
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    model: String,
    api_key_env: String,
    max_tokens: usize,
    http: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
}

impl AnthropicProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            http: reqwest::Client::new(),
            breaker: shared_circuit_breaker(),
        }
    }

    /// Provider for the model configured for a tier
    pub fn for_tier(models: &ModelConfig, tier: Tier) -> Self {
        Self::new(models.for_tier(tier)).with_api_key_env(models.api_key_env.clone())
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_api_key_env(mut self, env_var: impl Into<String>) -> Self {
        self.api_key_env = env_var.into();
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    fn request(&self, prompt: &str, role: InferenceRole) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(role.system_prompt().to_string()),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        }
    }
}

#[async_trait]
impl InferenceProvider for AnthropicProvider {
    async fn infer(&self, prompt: &str, role: InferenceRole) -> Result<String> {
        if !self.breaker.can_execute() {
            return Err(MosaicError::ApiLimit(format!(
                "Circuit breaker is open after repeated API failures, retry in {}s",
                self.breaker.time_until_retry() / 1000
            )));
        }

        let key = auth::api_key(&self.api_key_env)?;
        let request = self.request(prompt, role);

        let mut retries = 0;
        let mut backoff_secs = INITIAL_BACKOFF_SECS;

        loop {
            debug!(model = %self.model, %role, attempt = retries + 1, "Sending inference request");

            let response = self
                .http
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await
                .map_err(|e| MosaicError::Api(format!("Failed to send request: {}", e)))?;

            let status = response.status();

            if status.as_u16() == 429 {
                retries += 1;
                if retries > MAX_RETRIES {
                    let body = response.text().await.unwrap_or_default();
                    return Err(MosaicError::ApiLimit(format!(
                        "Rate limit exceeded after {} retries: {}",
                        MAX_RETRIES, body
                    )));
                }

                let wait_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(backoff_secs);

                warn!(wait_secs, retries, max = MAX_RETRIES, "Rate limited (429)");
                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();

                if status.is_server_error() && retries < MAX_RETRIES {
                    retries += 1;
                    warn!(%status, backoff_secs, retries, "Server error, backing off");
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    continue;
                }

                self.breaker.record_failure();
                error!(
                    failures = self.breaker.failure_count(),
                    %status,
                    "Inference request failed"
                );
                return Err(MosaicError::Api(format!(
                    "Anthropic API error {}: {}",
                    status, body
                )));
            }

            let parsed: AnthropicResponse = response
                .json()
                .await
                .map_err(|e| MosaicError::Api(format!("Failed to parse response: {}", e)))?;

            let text = parsed.text();
            if text.trim().is_empty() {
                return Err(MosaicError::Inference("Empty response from model".to_string()));
            }

            self.breaker.record_success();
            match parsed.usage {
                Some(usage) => info!(
                    model = %self.model,
                    %role,
                    chars = text.len(),
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Inference complete"
                ),
                None => info!(model = %self.model, %role, chars = text.len(), "Inference complete"),
            }
            return Ok(text);
        }
    }

    fn label(&self) -> &str {
        &self.model
    }
}
