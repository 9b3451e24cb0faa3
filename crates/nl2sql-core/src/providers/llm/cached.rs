use super::LlmClient;
use crate::cache::key::completion_key;
use crate::model::LlmResponse;
use crate::storage::Store;
use async_trait::async_trait;
use std::sync::Arc;

/// Replays completions from the cache database and records new ones.
pub struct CachedClient {
    inner: Arc<dyn LlmClient>,
    store: Store,
    refresh: bool,
}

impl CachedClient {
    pub fn new(inner: Arc<dyn LlmClient>, store: Store, refresh: bool) -> Self {
        Self {
            inner,
            store,
            refresh,
        }
    }
}

#[async_trait]
impl LlmClient for CachedClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse> {
        let key = completion_key(self.inner.provider_name(), self.inner.model(), prompt);
        if !self.refresh {
            if let Some(hit) = self.store.cache_get(&key)? {
                tracing::debug!(event = "nl2sql.cache.hit", key = %key);
                return Ok(hit);
            }
        }
        let resp = self.inner.complete(prompt).await?;
        self.store.cache_put(&key, &resp)?;
        Ok(resp)
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::FakeClient;

    #[tokio::test]
    async fn second_call_is_served_from_cache() -> anyhow::Result<()> {
        let fake = Arc::new(FakeClient::always("SELECT 1"));
        let client = CachedClient::new(fake.clone(), Store::memory()?, false);
        let a = client.complete("prompt").await?;
        let b = client.complete("prompt").await?;
        assert!(!a.cached);
        assert!(b.cached);
        assert_eq!(b.text, "SELECT 1");
        assert_eq!(fake.calls(), 1);
        assert_eq!(client.store.stats()?.completions, 1);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_bypasses_lookup() -> anyhow::Result<()> {
        let fake = Arc::new(FakeClient::always("SELECT 1"));
        let client = CachedClient::new(fake.clone(), Store::memory()?, true);
        client.complete("prompt").await?;
        client.complete("prompt").await?;
        assert_eq!(fake.calls(), 2);
        Ok(())
    }
}
