//! Language model access behind a narrow completion trait.
//!
//! Every model-driven decision in the factory and the runner goes through
//! [`ModelClient`], so the deterministic fallback paths can be exercised in
//! tests with a scripted implementation.

pub mod openai;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ModelError;

pub use openai::OpenAiModel;

/// One completion round-trip: a system preamble plus a user message.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError>;
}

/// Retry budget for model round-trips. Exhaustion means the model is treated
/// as unavailable and the caller takes its fallback path.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let delay = (self.initial_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Parse model output as JSON, tolerating prose or code fences around the
/// object by retrying on the first-`{`-to-last-`}` slice.
pub fn extract_json(content: &str) -> Result<Value, ModelError> {
    if let Ok(value) = serde_json::from_str(content) {
        return Ok(value);
    }
    if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}'))
        && start < end
        && let Ok(value) = serde_json::from_str(&content[start..=end])
    {
        return Ok(value);
    }
    let preview: String = content.chars().take(200).collect();
    Err(ModelError::Parse(preview))
}
