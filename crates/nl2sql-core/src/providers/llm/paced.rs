use super::LlmClient;
use crate::errors::{provider_error_kind, ProviderError, ProviderErrorKind};
use crate::model::LlmResponse;
use crate::retry::{Pacer, RetryPolicy};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Wraps a client with request pacing, a per-call timeout and rate-limit
/// retries. Errors that come out of here have already used up their retries.
pub struct PacedClient {
    inner: Arc<dyn LlmClient>,
    pacer: Pacer,
    retry: RetryPolicy,
    timeout: Duration,
}

impl PacedClient {
    pub fn new(
        inner: Arc<dyn LlmClient>,
        min_interval: Duration,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            inner,
            pacer: Pacer::new(min_interval),
            retry,
            timeout,
        }
    }
}

#[async_trait]
impl LlmClient for PacedClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse> {
        let mut retry = 0;
        loop {
            self.pacer.wait().await;
            let err = match tokio::time::timeout(self.timeout, self.inner.complete(prompt)).await {
                Ok(Ok(resp)) => return Ok(resp),
                Ok(Err(e)) => e,
                Err(_) => {
                    return Err(ProviderError::new(
                        ProviderErrorKind::Timeout,
                        format!(
                            "{} did not answer within {}s",
                            self.inner.provider_name(),
                            self.timeout.as_secs()
                        ),
                    )
                    .into())
                }
            };

            let kind = provider_error_kind(&err).unwrap_or(ProviderErrorKind::Other);
            match self.retry.delay_for(retry, kind) {
                Some(delay) => {
                    tracing::warn!(
                        event = "nl2sql.provider.rate_limited",
                        provider = self.inner.provider_name(),
                        retry = retry + 1,
                        max_retries = self.retry.max_retries,
                        wait_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                None => return Err(err),
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}
