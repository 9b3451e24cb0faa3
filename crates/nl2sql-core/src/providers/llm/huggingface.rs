use super::{transport_error, LlmClient};
use crate::errors::ProviderError;
use crate::model::LlmResponse;
use async_trait::async_trait;
use serde_json::json;

pub const HF_INFERENCE_URL: &str = "https://api-inference.huggingface.co/models";

/// Hosted text-generation endpoint. Greedy decoding stands in for temperature 0,
/// which the endpoint rejects.
pub struct HuggingFaceClient {
    pub model: String,
    pub api_key: String,
    pub max_new_tokens: u32,
    base_url: String,
    client: reqwest::Client,
}

impl HuggingFaceClient {
    pub fn new(model: String, api_key: String, max_new_tokens: u32) -> Self {
        Self {
            model,
            api_key,
            max_new_tokens,
            base_url: HF_INFERENCE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClient for HuggingFaceClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse> {
        let url = format!("{}/{}", self.base_url, self.model);
        let body = json!({
            "inputs": prompt,
            "parameters": {
                "do_sample": false,
                "max_new_tokens": self.max_new_tokens,
                "return_full_text": false
            }
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("huggingface", e))?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &error_text).into());
        }

        let json: serde_json::Value = resp.json().await?;
        let text = json
            .pointer("/0/generated_text")
            .or_else(|| json.pointer("/generated_text"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("huggingface response missing generated_text"))?
            .to_string();

        Ok(LlmResponse {
            text,
            provider: "huggingface".to_string(),
            model: self.model.clone(),
            cached: false,
        })
    }

    fn provider_name(&self) -> &'static str {
        "huggingface"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
