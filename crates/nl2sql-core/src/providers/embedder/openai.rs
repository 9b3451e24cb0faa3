use super::Embedder;
use crate::errors::ProviderError;
use crate::providers::llm::openai::OPENAI_BASE_URL;
use crate::providers::llm::transport_error;
use async_trait::async_trait;
use serde_json::json;

pub struct OpenAIEmbedder {
    pub model: String,
    pub api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    pub fn new(model: String, api_key: String) -> Self {
        Self {
            model,
            api_key,
            base_url: OPENAI_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn request(&self, input: serde_json::Value) -> anyhow::Result<Vec<Vec<f32>>> {
        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": input }))
            .send()
            .await
            .map_err(|e| transport_error("openai", e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &text).into());
        }

        let json: serde_json::Value = resp.json().await?;
        let data = json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| anyhow::anyhow!("openai embeddings response missing data"))?;

        data.iter()
            .map(|item| {
                item.get("embedding")
                    .and_then(|e| e.as_array())
                    .ok_or_else(|| anyhow::anyhow!("openai embeddings item missing embedding"))
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|x| x.as_f64())
                            .map(|x| x as f32)
                            .collect()
                    })
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.request(json!(text))
            .await?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("openai embeddings response was empty"))
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let out = self.request(json!(texts)).await?;
        if out.len() != texts.len() {
            anyhow::bail!(
                "openai embeddings returned {} vectors for {} inputs",
                out.len(),
                texts.len()
            );
        }
        Ok(out)
    }

    fn model_id(&self) -> String {
        format!("openai:{}", self.model)
    }
}
