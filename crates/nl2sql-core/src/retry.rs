use crate::errors::ProviderErrorKind;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential { base: Duration, max: Duration },
}

/// Decides whether a failed provider call is retried and how long to wait.
/// Only rate limits are retried; they never count against the repair budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::Fixed(Duration::from_secs(60)),
        }
    }
}

impl RetryPolicy {
    /// `retry` is zero-based: the delay before the first retry is `delay_for(0, ..)`.
    pub fn delay_for(&self, retry: u32, kind: ProviderErrorKind) -> Option<Duration> {
        if kind != ProviderErrorKind::RateLimited || retry >= self.max_retries {
            return None;
        }
        Some(match self.backoff {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(retry);
                base.saturating_mul(factor).min(max)
            }
        })
    }
}

/// Enforces a minimum interval between consecutive requests.
pub struct Pacer {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready = prev + self.min_interval;
            if ready > Instant::now() {
                tokio::time::sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limits_are_retried() {
        let p = RetryPolicy::default();
        assert_eq!(
            p.delay_for(0, ProviderErrorKind::RateLimited),
            Some(Duration::from_secs(60))
        );
        assert_eq!(p.delay_for(0, ProviderErrorKind::Auth), None);
        assert_eq!(p.delay_for(0, ProviderErrorKind::Timeout), None);
        assert_eq!(p.delay_for(3, ProviderErrorKind::RateLimited), None);
    }

    #[test]
    fn exponential_is_capped() {
        let p = RetryPolicy {
            max_retries: 10,
            backoff: Backoff::Exponential {
                base: Duration::from_secs(2),
                max: Duration::from_secs(10),
            },
        };
        let k = ProviderErrorKind::RateLimited;
        assert_eq!(p.delay_for(0, k), Some(Duration::from_secs(2)));
        assert_eq!(p.delay_for(1, k), Some(Duration::from_secs(4)));
        assert_eq!(p.delay_for(5, k), Some(Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_spaces_requests() {
        let pacer = Pacer::new(Duration::from_millis(2500));
        let t0 = Instant::now();
        pacer.wait().await;
        pacer.wait().await;
        pacer.wait().await;
        assert!(t0.elapsed() >= Duration::from_millis(5000));
    }
}
