//! Caller-side retry with exponential backoff.
//!
//! Provider adapters never retry on their own; operator-facing paths such as
//! `rbi ingest` wrap the whole operation here instead. Only errors for which
//! [`rainbow_intel_core::Error::is_retryable`] holds are retried.

use std::future::Future;
use std::time::Duration;

use rainbow_intel_core::Result;

/// Backoff schedule: `base`, `2·base`, `4·base`, … capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    pub max_retries: u32,
}

impl Backoff {
    /// 1s, 2s, 4s, 8s, … capped at 32s.
    pub fn standard(max_retries: u32) -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(32),
            max_retries,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(5);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// retry budget is spent. The last error is returned.
pub async fn with_backoff<T, F, Fut>(backoff: Backoff, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < backoff.max_retries => {
                attempt += 1;
                let delay = backoff.delay(attempt);
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rainbow_intel_core::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> Backoff {
        Backoff {
            base: Duration::from_millis(1),
            max: Duration::from_millis(4),
            max_retries,
        }
    }

    #[test]
    fn test_standard_schedule() {
        let b = Backoff::standard(10);
        assert_eq!(b.delay(1), Duration::from_secs(1));
        assert_eq!(b.delay(2), Duration::from_secs(2));
        assert_eq!(b.delay(3), Duration::from_secs(4));
        assert_eq!(b.delay(6), Duration::from_secs(32));
        assert_eq!(b.delay(9), Duration::from_secs(32));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_backoff(fast(3), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::ProviderRateLimited("429".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_backoff(fast(2), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::embedding(Error::ProviderTimeout("slow".into())))
        })
        .await;
        assert!(matches!(result, Err(Error::EmbeddingFailed(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_backoff(fast(5), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Unauthorized)
        })
        .await;
        assert!(matches!(result, Err(Error::Unauthorized)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
