pub mod exchange_provider;
pub mod external_market_provider;
pub mod onchain_provider;
pub mod sentiment_provider;

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, backoff_base: Duration::from_millis(200) }
    }
}

/// Exponential backoff with jitter around a fallible async operation. Every
/// provider call goes through this so the policy is testable independent of
/// any particular transport.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries => {
                attempt += 1;
                let jitter_ms = rand::rng().random_range(0..50);
                let backoff = policy.backoff_base * 2u32.pow(attempt - 1) + Duration::from_millis(jitter_ms);
                warn!(attempt, %err, "provider call failed, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy { max_retries: 3, backoff_base: Duration::from_millis(1) };
        let result: Result<u32, &str> = with_retry(policy, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 { Err("transient") } else { Ok(42) }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_retries() {
        let policy = RetryPolicy { max_retries: 1, backoff_base: Duration::from_millis(1) };
        let result: Result<u32, &str> = with_retry(policy, || async { Err("down") }).await;
        assert_eq!(result, Err("down"));
    }
}
