//! Cross-asset correlation and macro-event calendar access.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::application::cache::{self, Cache, CacheLookup};
use crate::application::providers::{with_retry, RetryPolicy};
use crate::domain::ports::ExternalMarketProvider;
use crate::domain::signals::MacroEvent;

pub const CORRELATION_TTL: Duration = Duration::from_secs(3600);
pub const MACRO_CALENDAR_TTL: Duration = Duration::from_secs(3600);

pub struct MarketContextProvider {
    source: Arc<dyn ExternalMarketProvider>,
    cache: Arc<dyn Cache>,
    retry: RetryPolicy,
}

impl MarketContextProvider {
    pub fn new(source: Arc<dyn ExternalMarketProvider>, cache: Arc<dyn Cache>) -> Self {
        Self { source, cache, retry: RetryPolicy::default() }
    }

    pub async fn btc_eth_correlation(&self) -> (f64, f64) {
        let key = "corr:btc_eth";
        if let CacheLookup::Hit { value, age_seconds } = cache::get::<f64>(self.cache.as_ref(), key).await {
            return (value, (1.0 - age_seconds / CORRELATION_TTL.as_secs_f64()).max(0.3));
        }
        let source = self.source.clone();
        match with_retry(self.retry, || {
            let source = source.clone();
            async move { source.btc_eth_correlation().await }
        })
        .await
        {
            Ok(value) => {
                cache::set(self.cache.as_ref(), key, &value, CORRELATION_TTL).await;
                (value, 1.0)
            }
            Err(err) => {
                warn!(%err, "btc/eth correlation fetch exhausted retries");
                (0.0, 0.0)
            }
        }
    }

    pub async fn btc_spx_correlation(&self) -> (Option<f64>, f64) {
        match self.source.btc_spx_correlation().await {
            Ok(value) => (value, 1.0),
            Err(err) => {
                warn!(%err, "btc/spx correlation unavailable");
                (None, 0.0)
            }
        }
    }

    pub async fn macro_events_upcoming(&self, within_days: i64) -> (Vec<MacroEvent>, f64) {
        match with_retry(self.retry, || {
            let source = self.source.clone();
            async move { source.macro_events_upcoming(within_days).await }
        })
        .await
        {
            Ok(events) => (events, 1.0),
            Err(err) => {
                warn!(%err, "macro calendar fetch exhausted retries");
                (Vec::new(), 0.0)
            }
        }
    }
}
