//! Deterministic mock implementations of the on-chain, external-market, and
//! sentiment collaborators. A live integration (on-chain indexer, macro
//! calendar feed, fear/greed API) is out of scope; these stand in so the
//! orchestrator's slow-bundle collection has something to call.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::domain::ports::{ExternalMarketProvider, OnChainProvider, SentimentProvider};
use crate::domain::signals::{MacroEvent, MacroImpact};

pub struct MockOnChainProvider;

#[async_trait]
impl OnChainProvider for MockOnChainProvider {
    async fn token_unlocks_7d(&self, _coin: &str) -> Result<f64> {
        Ok(0.0)
    }

    async fn whale_net_flow_24h(&self, _coin: &str) -> Result<(f64, f64, u64)> {
        Ok((0.0, 0.0, 0))
    }
}

pub struct MockExternalMarketProvider {
    events: RwLock<Vec<MacroEvent>>,
}

impl MockExternalMarketProvider {
    pub fn new() -> Self {
        Self { events: RwLock::new(Vec::new()) }
    }

    pub fn schedule_event(&self, name: &str, in_hours: i64, impact: MacroImpact) {
        self.events.write().unwrap().push(MacroEvent {
            name: name.to_string(),
            scheduled_at: Utc::now() + Duration::hours(in_hours),
            impact,
        });
    }
}

impl Default for MockExternalMarketProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExternalMarketProvider for MockExternalMarketProvider {
    async fn btc_eth_correlation(&self) -> Result<f64> {
        Ok(0.8)
    }

    async fn btc_spx_correlation(&self) -> Result<Option<f64>> {
        Ok(None)
    }

    async fn macro_events_upcoming(&self, within_days: i64) -> Result<Vec<MacroEvent>> {
        let horizon = Utc::now() + Duration::days(within_days);
        Ok(self.events.read().unwrap().iter().filter(|e| e.scheduled_at <= horizon).cloned().collect())
    }
}

pub struct MockSentimentProvider {
    index: RwLock<f64>,
}

impl MockSentimentProvider {
    pub fn new() -> Self {
        Self { index: RwLock::new(0.0) }
    }

    pub fn set_index(&self, value: f64) {
        *self.index.write().unwrap() = value;
    }
}

impl Default for MockSentimentProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SentimentProvider for MockSentimentProvider {
    async fn fear_greed_index(&self) -> Result<f64> {
        Ok(*self.index.read().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scheduled_event_appears_within_horizon() {
        let provider = MockExternalMarketProvider::new();
        provider.schedule_event("FOMC", 12, MacroImpact::High);
        let events = provider.macro_events_upcoming(7).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "FOMC");
    }

    #[tokio::test]
    async fn event_beyond_horizon_is_excluded() {
        let provider = MockExternalMarketProvider::new();
        provider.schedule_event("CPI", 24 * 30, MacroImpact::Medium);
        let events = provider.macro_events_upcoming(7).await.unwrap();
        assert!(events.is_empty());
    }
}
