//! Fear/greed index access, normalized to `[-1, +1]` for downstream use.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::application::cache::{self, Cache, CacheLookup};
use crate::application::providers::{with_retry, RetryPolicy};
use crate::domain::ports::SentimentProvider;

pub const TTL: Duration = Duration::from_secs(1800);

pub struct FearGreedProvider {
    source: Arc<dyn SentimentProvider>,
    cache: Arc<dyn Cache>,
    retry: RetryPolicy,
}

impl FearGreedProvider {
    pub fn new(source: Arc<dyn SentimentProvider>, cache: Arc<dyn Cache>) -> Self {
        Self { source, cache, retry: RetryPolicy::default() }
    }

    pub async fn fear_greed_index(&self) -> (f64, f64) {
        let key = "sentiment:fear_greed";
        if let CacheLookup::Hit { value, age_seconds } = cache::get::<f64>(self.cache.as_ref(), key).await {
            return (value, (1.0 - age_seconds / TTL.as_secs_f64()).max(0.3));
        }
        let source = self.source.clone();
        match with_retry(self.retry, || {
            let source = source.clone();
            async move { source.fear_greed_index().await }
        })
        .await
        {
            Ok(value) => {
                cache::set(self.cache.as_ref(), key, &value, TTL).await;
                (value, 1.0)
            }
            Err(err) => {
                warn!(%err, "fear/greed fetch exhausted retries, using neutral fallback");
                (0.0, 0.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cache::InMemoryCache;
    use crate::infrastructure::market_context::MockSentimentProvider;

    #[tokio::test]
    async fn returns_configured_index_with_full_confidence_on_fresh_fetch() {
        let source = Arc::new(MockSentimentProvider::new());
        source.set_index(0.4);
        let provider = FearGreedProvider::new(source, Arc::new(InMemoryCache::new()));
        let (value, confidence) = provider.fear_greed_index().await;
        assert_eq!(value, 0.4);
        assert_eq!(confidence, 1.0);
    }
}
