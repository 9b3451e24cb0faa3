use crate::model::LlmResponse;
use async_trait::async_trait;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse>;
    fn provider_name(&self) -> &'static str;
    fn model(&self) -> &str;
}

pub mod cached;
pub mod fake;
pub mod huggingface;
pub mod openai;
pub mod paced;

pub use cached::CachedClient;
pub use fake::FakeClient;
pub use huggingface::HuggingFaceClient;
pub use openai::OpenAIClient;
pub use paced::PacedClient;

/// Maps a transport failure into a classified provider error.
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> anyhow::Error {
    use crate::errors::{ProviderError, ProviderErrorKind};
    let kind = if e.is_timeout() {
        ProviderErrorKind::Timeout
    } else if e.is_connect() {
        ProviderErrorKind::Unavailable
    } else {
        ProviderErrorKind::Other
    };
    anyhow::Error::new(ProviderError::new(kind, format!("{} request failed: {}", provider, e)))
}
