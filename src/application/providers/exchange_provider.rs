//! Cached, retried access to the authoritative exchange collaborator: order
//! books, candles, funding history, open interest.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::application::cache::{self, Cache, CacheLookup};
use crate::application::providers::{with_retry, RetryPolicy};
use crate::domain::ports::{Candle, ExchangeClient, FundingPoint, OpenInterestPoint, OrderBook};

pub struct ProviderResult<T> {
    pub value: T,
    pub confidence: f64,
    pub is_cached: bool,
    pub age_seconds: f64,
}

pub const ORDER_BOOK_TTL: Duration = Duration::from_secs(10);
pub const CANDLE_TTL: Duration = Duration::from_secs(300);
pub const FUNDING_TTL: Duration = Duration::from_secs(600);
pub const OI_TTL: Duration = Duration::from_secs(300);

pub struct ExchangeProvider {
    exchange: Arc<dyn ExchangeClient>,
    cache: Arc<dyn Cache>,
    retry: RetryPolicy,
}

impl ExchangeProvider {
    pub fn new(exchange: Arc<dyn ExchangeClient>, cache: Arc<dyn Cache>) -> Self {
        Self { exchange, cache, retry: RetryPolicy::default() }
    }

    pub async fn order_book(&self, coin: &str) -> ProviderResult<OrderBook> {
        let key = format!("orderbook:{coin}");
        if let CacheLookup::Hit { value, age_seconds } = cache::get::<OrderBook>(self.cache.as_ref(), &key).await {
            let confidence = (1.0 - age_seconds / ORDER_BOOK_TTL.as_secs_f64()).max(0.3);
            return ProviderResult { value, confidence, is_cached: true, age_seconds };
        }

        let exchange = self.exchange.clone();
        let coin_owned = coin.to_string();
        match with_retry(self.retry, || {
            let exchange = exchange.clone();
            let coin = coin_owned.clone();
            async move { exchange.fetch_order_book(&coin).await }
        })
        .await
        {
            Ok(book) => {
                cache::set(self.cache.as_ref(), &key, &book, ORDER_BOOK_TTL).await;
                ProviderResult { value: book, confidence: 1.0, is_cached: false, age_seconds: 0.0 }
            }
            Err(err) => {
                warn!(coin, %err, "order book fetch exhausted retries, returning empty book");
                ProviderResult {
                    value: OrderBook { bids: Vec::new(), asks: Vec::new(), timestamp: Utc::now() },
                    confidence: 0.0,
                    is_cached: false,
                    age_seconds: 0.0,
                }
            }
        }
    }

    pub async fn candles(&self, coin: &str, interval: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ProviderResult<Vec<Candle>> {
        let key = format!("candles:{coin}:{interval}:{}:{}", start.timestamp(), end.timestamp());
        if let CacheLookup::Hit { value, age_seconds } = cache::get::<Vec<Candle>>(self.cache.as_ref(), &key).await {
            let confidence = (1.0 - age_seconds / CANDLE_TTL.as_secs_f64()).max(0.3);
            return ProviderResult { value, confidence, is_cached: true, age_seconds };
        }

        let exchange = self.exchange.clone();
        let coin_owned = coin.to_string();
        let interval_owned = interval.to_string();
        // A venue's historical API caps a single request at 5000 bars; the
        // mock/real client is expected to enforce this itself.
        match with_retry(self.retry, || {
            let exchange = exchange.clone();
            let coin = coin_owned.clone();
            let interval = interval_owned.clone();
            async move { exchange.fetch_candles(&coin, &interval, start, end).await }
        })
        .await
        {
            Ok(candles) => {
                cache::set(self.cache.as_ref(), &key, &candles, CANDLE_TTL).await;
                ProviderResult { value: candles, confidence: 1.0, is_cached: false, age_seconds: 0.0 }
            }
            Err(err) => {
                warn!(coin, %err, "candle fetch exhausted retries, returning empty history");
                ProviderResult { value: Vec::new(), confidence: 0.0, is_cached: false, age_seconds: 0.0 }
            }
        }
    }

    pub async fn funding_history(&self, coin: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ProviderResult<Vec<FundingPoint>> {
        let key = format!("funding:{coin}:{}:{}", start.timestamp(), end.timestamp());
        if let CacheLookup::Hit { value, age_seconds } = cache::get::<Vec<FundingPoint>>(self.cache.as_ref(), &key).await {
            let confidence = (1.0 - age_seconds / FUNDING_TTL.as_secs_f64()).max(0.3);
            return ProviderResult { value, confidence, is_cached: true, age_seconds };
        }

        let exchange = self.exchange.clone();
        let coin_owned = coin.to_string();
        match with_retry(self.retry, || {
            let exchange = exchange.clone();
            let coin = coin_owned.clone();
            async move { exchange.fetch_funding_history(&coin, start, end).await }
        })
        .await
        {
            Ok(points) => {
                cache::set(self.cache.as_ref(), &key, &points, FUNDING_TTL).await;
                ProviderResult { value: points, confidence: 1.0, is_cached: false, age_seconds: 0.0 }
            }
            Err(err) => {
                warn!(coin, %err, "funding history fetch exhausted retries");
                ProviderResult { value: Vec::new(), confidence: 0.0, is_cached: false, age_seconds: 0.0 }
            }
        }
    }

    /// Derives a `[0,1]` venue health score from the meta call's round-trip
    /// latency and the schema validity of the markets it returns (non-empty
    /// name, a plausible size-decimals precision). Not cached — it is meant
    /// to reflect the venue's current responsiveness, not a stale reading.
    pub async fn venue_health(&self) -> f64 {
        let started = std::time::Instant::now();
        let meta = self.exchange.meta().await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let Ok(markets) = meta else {
            warn!("venue health check failed: meta call errored");
            return 0.0;
        };
        if markets.is_empty() {
            return 0.0;
        }

        let valid = markets.iter().filter(|m| !m.name.is_empty() && m.size_decimals <= 18).count();
        let schema_score = valid as f64 / markets.len() as f64;
        let latency_score = (1.0 - latency_ms / 2000.0).clamp(0.0, 1.0);
        ((schema_score + latency_score) / 2.0).clamp(0.0, 1.0)
    }

    pub async fn open_interest(&self, coin: &str) -> ProviderResult<Option<OpenInterestPoint>> {
        let key = format!("oi:{coin}");
        if let CacheLookup::Hit { value, age_seconds } = cache::get::<OpenInterestPoint>(self.cache.as_ref(), &key).await {
            let confidence = (1.0 - age_seconds / OI_TTL.as_secs_f64()).max(0.3);
            return ProviderResult { value: Some(value), confidence, is_cached: true, age_seconds };
        }

        let exchange = self.exchange.clone();
        let coin_owned = coin.to_string();
        match with_retry(self.retry, || {
            let exchange = exchange.clone();
            let coin = coin_owned.clone();
            async move { exchange.fetch_open_interest(&coin).await }
        })
        .await
        {
            Ok(point) => {
                cache::set(self.cache.as_ref(), &key, &point, OI_TTL).await;
                ProviderResult { value: Some(point), confidence: 1.0, is_cached: false, age_seconds: 0.0 }
            }
            Err(err) => {
                warn!(coin, %err, "open interest fetch exhausted retries");
                ProviderResult { value: None, confidence: 0.0, is_cached: false, age_seconds: 0.0 }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cache::InMemoryCache;
    use crate::infrastructure::exchange::mock::MockExchangeClient;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn order_book_second_call_is_served_from_cache() {
        let exchange = Arc::new(MockExchangeClient::with_default_markets());
        let cache = Arc::new(InMemoryCache::new());
        let provider = ExchangeProvider::new(exchange, cache);
        let first = provider.order_book("BTC").await;
        assert!(!first.is_cached);
        let second = provider.order_book("BTC").await;
        assert!(second.is_cached);
        assert!(second.confidence >= 0.3);
    }

    #[tokio::test]
    async fn venue_health_is_high_for_a_responsive_well_formed_meta() {
        let exchange = Arc::new(MockExchangeClient::with_default_markets());
        let cache = Arc::new(InMemoryCache::new());
        let provider = ExchangeProvider::new(exchange, cache);
        let health = provider.venue_health().await;
        assert!((0.0..=1.0).contains(&health));
        assert!(health > 0.5);
    }

    #[tokio::test]
    async fn candles_span_requested_window() {
        let exchange = Arc::new(MockExchangeClient::with_default_markets());
        let cache = Arc::new(InMemoryCache::new());
        let provider = ExchangeProvider::new(exchange, cache);
        let end = Utc::now();
        let start = end - ChronoDuration::hours(10);
        let result = provider.candles("BTC", "1h", start, end).await;
        assert_eq!(result.value.len(), 10);
        assert_eq!(result.confidence, 1.0);
    }
}
