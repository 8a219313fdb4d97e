use async_trait::async_trait;
use rig::{agent::AgentBuilder, client::CompletionClient, completion::Prompt, providers::openai};
use tracing::warn;

use crate::config::Settings;
use crate::error::ModelError;
use crate::llm::{CompletionRequest, ModelClient, RetryConfig};

/// OpenAI-backed model client. Each round-trip gets a per-attempt timeout and
/// transient failures are retried with exponential backoff before the caller
/// falls back to its deterministic path.
pub struct OpenAiModel {
    api_key: String,
    model: String,
    retry: RetryConfig,
}

impl OpenAiModel {
    /// Returns `None` when no API key is configured, which callers treat as
    /// "model unavailable".
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        settings.openai_api_key.as_ref().map(|api_key| Self {
            api_key: api_key.clone(),
            model: settings.openai_model.clone(),
            retry: RetryConfig::default(),
        })
    }

    async fn prompt_once(&self, request: &CompletionRequest) -> Result<String, ModelError> {
        let client = openai::Client::new(&self.api_key);
        let model = client.completion_model(&self.model);
        let agent = AgentBuilder::new(model)
            .preamble(&request.system)
            .temperature(request.temperature)
            .build();

        let response = tokio::time::timeout(
            self.retry.attempt_timeout,
            agent.prompt(request.user.as_str()),
        )
        .await
        .map_err(|_| ModelError::Provider("model call timed out".to_string()))?
        .map_err(|err| ModelError::Provider(err.to_string()))?;

        if response.trim().is_empty() {
            return Err(ModelError::Empty);
        }
        Ok(response)
    }
}

#[async_trait]
impl ModelClient for OpenAiModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError> {
        let mut attempt = 0;
        loop {
            match self.prompt_once(&request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    attempt += 1;
                    if attempt > self.retry.max_retries {
                        return Err(err);
                    }
                    warn!(error = %err, attempt, "model call failed, retrying");
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                }
            }
        }
    }
}
