//! Language model client for coaching analyses.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::CoachError;

/// Chat-style completion seam. The engine only ever needs one system
/// instruction and one user message per analysis.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, CoachError>;
}

#[derive(Debug, Clone)]
pub struct ChatModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Moderate sampling keeps suggestions varied without drifting off
    /// the schema.
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub request_timeout: Duration,
}

impl Default for ChatModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_owned(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_owned(),
            temperature: 0.7,
            max_output_tokens: 300,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Chat-completions client against an OpenAI-compatible endpoint.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    config: ChatModelConfig,
}

impl OpenAiChatModel {
    pub fn new(config: ChatModelConfig) -> Result<Self, CoachError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CoachError::Analysis(format!("building model client: {e}")))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String, CoachError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_output_tokens,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoachError::Analysis("model call timed out".into())
                } else {
                    CoachError::Analysis(format!("model call failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoachError::Analysis(format!("model HTTP {status}: {body}")));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoachError::Analysis(format!("reading model response: {e}")))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| CoachError::Analysis("model response missing content".into()))
    }
}
