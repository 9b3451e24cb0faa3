use super::{transport_error, LlmClient};
use crate::errors::ProviderError;
use crate::model::LlmResponse;
use async_trait::async_trait;
use serde_json::json;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Chat-completions client for OpenAI and API-compatible hosts (Groq, local
/// servers). Sampling temperature is always zero.
pub struct OpenAIClient {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub max_tokens: u32,
    provider: &'static str,
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(model: String, api_key: String, max_tokens: u32) -> Self {
        Self::with_base_url("openai", OPENAI_BASE_URL, model, api_key, max_tokens)
    }

    pub fn groq(model: String, api_key: String, max_tokens: u32) -> Self {
        Self::with_base_url("groq", GROQ_BASE_URL, model, api_key, max_tokens)
    }

    pub fn with_base_url(
        provider: &'static str,
        base_url: &str,
        model: String,
        api_key: String,
        max_tokens: u32,
    ) -> Self {
        Self {
            model,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_tokens,
            provider,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You translate questions into SQLite SQL. Reply with SQL only."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0,
            "max_tokens": self.max_tokens,
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(self.provider, e))?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &error_text).into());
        }

        let json: serde_json::Value = resp.json().await?;
        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("{} API response missing content", self.provider))?
            .to_string();

        Ok(LlmResponse {
            text,
            provider: self.provider.to_string(),
            model: self.model.clone(),
            cached: false,
        })
    }

    fn provider_name(&self) -> &'static str {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }
}
