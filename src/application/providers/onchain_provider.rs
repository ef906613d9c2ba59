//! Cached access to token-unlock and whale-flow data. On exhaustion both
//! operations fall back to a zero-flow value with confidence 0 rather than
//! propagating an error to the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::application::cache::{self, Cache, CacheLookup};
use crate::application::providers::{with_retry, RetryPolicy};
use crate::domain::ports::OnChainProvider;

pub const TTL: Duration = Duration::from_secs(1800);

pub struct OnChainDataProvider {
    source: Arc<dyn OnChainProvider>,
    cache: Arc<dyn Cache>,
    retry: RetryPolicy,
}

pub struct WhaleFlowResult {
    pub inflow: f64,
    pub outflow: f64,
    pub tx_count: u64,
    pub confidence: f64,
}

impl OnChainDataProvider {
    pub fn new(source: Arc<dyn OnChainProvider>, cache: Arc<dyn Cache>) -> Self {
        Self { source, cache, retry: RetryPolicy::default() }
    }

    pub async fn token_unlocks_7d(&self, coin: &str) -> (f64, f64) {
        let key = format!("unlocks:{coin}");
        if let CacheLookup::Hit { value, age_seconds } = cache::get::<f64>(self.cache.as_ref(), &key).await {
            return (value, (1.0 - age_seconds / TTL.as_secs_f64()).max(0.3));
        }
        let source = self.source.clone();
        let coin_owned = coin.to_string();
        match with_retry(self.retry, || {
            let source = source.clone();
            let coin = coin_owned.clone();
            async move { source.token_unlocks_7d(&coin).await }
        })
        .await
        {
            Ok(value) => {
                cache::set(self.cache.as_ref(), &key, &value, TTL).await;
                (value, 1.0)
            }
            Err(err) => {
                warn!(coin, %err, "token unlock fetch exhausted retries");
                (0.0, 0.0)
            }
        }
    }

    pub async fn whale_net_flow_24h(&self, coin: &str) -> WhaleFlowResult {
        let source = self.source.clone();
        let coin_owned = coin.to_string();
        match with_retry(self.retry, || {
            let source = source.clone();
            let coin = coin_owned.clone();
            async move { source.whale_net_flow_24h(&coin).await }
        })
        .await
        {
            Ok((inflow, outflow, tx_count)) => WhaleFlowResult { inflow, outflow, tx_count, confidence: 1.0 },
            Err(err) => {
                warn!(coin, %err, "whale flow fetch exhausted retries");
                WhaleFlowResult { inflow: 0.0, outflow: 0.0, tx_count: 0, confidence: 0.0 }
            }
        }
    }
}
