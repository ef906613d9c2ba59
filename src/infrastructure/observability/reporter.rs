//! Push-based metrics reporter for the governor core.
//!
//! Periodically outputs metrics as structured JSON to stdout.
//! No HTTP server, no incoming connections — only outbound data.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use tracing::{info, warn};

use crate::application::cache::Cache;
use crate::application::governor::StrategyGovernor;
use crate::application::regime_detector::RegimeDetector;
use crate::domain::ports::ExchangeClient;
use crate::domain::regime::Regime;
use crate::infrastructure::observability::metrics::Metrics;

/// Metrics snapshot for JSON output
#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub portfolio: PortfolioSnapshot,
    pub governor: GovernorSnapshot,
    pub system: SystemSnapshot,
}

#[derive(Serialize)]
pub struct PortfolioSnapshot {
    pub available_balance_usd: f64,
    pub total_value_usd: f64,
    pub positions_count: usize,
    pub positions: Vec<PositionSnapshot>,
}

#[derive(Serialize)]
pub struct PositionSnapshot {
    pub coin: String,
    pub size: f64,
    pub entry_price: f64,
    pub current_value: f64,
}

#[derive(Serialize)]
pub struct GovernorSnapshot {
    pub active_plan_id: Option<String>,
    pub regime: String,
    pub rebalance_progress: f64,
    pub shadow_portfolio_count: usize,
}

#[derive(Serialize)]
pub struct SystemSnapshot {
    pub cache_hit_rate: f64,
    pub account_is_stale: bool,
}

/// Push-based metrics reporter
///
/// Outputs metrics as structured JSON logs on a configurable interval.
/// No HTTP server, no incoming connections - only outbound data.
pub struct MetricsReporter {
    exchange: Arc<dyn ExchangeClient>,
    governor: Arc<StrategyGovernor>,
    regime_detector: Arc<RegimeDetector>,
    cache: Arc<dyn Cache>,
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        governor: Arc<StrategyGovernor>,
        regime_detector: Arc<RegimeDetector>,
        cache: Arc<dyn Cache>,
        metrics: Metrics,
        interval_seconds: u64,
    ) -> Self {
        Self {
            exchange,
            governor,
            regime_detector,
            cache,
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds),
        }
    }

    /// Run the reporter in a loop, outputting metrics periodically
    pub async fn run(self) {
        info!(interval = ?self.interval, "MetricsReporter: starting push-based metrics, JSON to stdout");

        loop {
            tokio::time::sleep(self.interval).await;

            match self.collect_snapshot().await {
                Ok(snapshot) => match serde_json::to_string(&snapshot) {
                    Ok(json) => {
                        // Special prefix so logs can be filtered downstream.
                        println!("METRICS_JSON:{json}");
                        info!(
                            portfolio_value = snapshot.portfolio.total_value_usd,
                            regime = %snapshot.governor.regime,
                            uptime_seconds = snapshot.uptime_seconds,
                            "metrics tick"
                        );
                    }
                    Err(err) => warn!(%err, "failed to serialize metrics snapshot"),
                },
                Err(err) => warn!(%err, "failed to collect metrics snapshot"),
            }
        }
    }

    async fn collect_snapshot(&self) -> anyhow::Result<MetricsSnapshot> {
        let uptime = self.start_time.elapsed().as_secs();
        let account = self.exchange.account_state().await?;
        let gov_snapshot = self.governor.snapshot().await;
        let regime = self.regime_detector.current_regime().await;
        let cache_metrics = self.cache.metrics();

        let positions: Vec<PositionSnapshot> = account
            .positions
            .iter()
            .map(|p| PositionSnapshot {
                coin: p.coin.clone(),
                size: p.size.to_f64().unwrap_or(0.0),
                entry_price: p.entry_price.to_f64().unwrap_or(0.0),
                current_value: p.notional().to_f64().unwrap_or(0.0),
            })
            .collect();

        let labels: Vec<String> = Regime::ALL.iter().map(|r| r.to_string()).collect();
        let label_refs: Vec<&str> = labels.iter().map(|s| s.as_str()).collect();
        self.metrics.set_current_regime(&regime.to_string(), &label_refs);

        self.metrics.portfolio_value_usd.set(account.portfolio_value.to_f64().unwrap_or(0.0));
        for position in &account.positions {
            self.metrics.set_position_value(&position.coin, position.notional().to_f64().unwrap_or(0.0));
        }
        self.metrics.rebalance_progress.set(gov_snapshot.rebalance_progress);
        self.metrics.shadow_portfolio_count.set(gov_snapshot.shadow_portfolios.len() as f64);
        self.metrics.cache_hit_rate.set(cache_metrics.hit_rate);

        Ok(MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            portfolio: PortfolioSnapshot {
                available_balance_usd: account.available_balance.to_f64().unwrap_or(0.0),
                total_value_usd: account.portfolio_value.to_f64().unwrap_or(0.0),
                positions_count: positions.len(),
                positions,
            },
            governor: GovernorSnapshot {
                active_plan_id: gov_snapshot.active_plan.as_ref().map(|p| p.plan_id.to_string()),
                regime: regime.to_string(),
                rebalance_progress: gov_snapshot.rebalance_progress,
                shadow_portfolio_count: gov_snapshot.shadow_portfolios.len(),
            },
            system: SystemSnapshot { cache_hit_rate: cache_metrics.hit_rate, account_is_stale: account.is_stale },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cache::InMemoryCache;
    use crate::application::regime_detector::RegimeDetector;
    use crate::application::rule_based_advisor::RuleBasedAdvisor;
    use crate::config::GovernorEnvConfig;
    use crate::domain::repositories::GovernorRepository;
    use crate::infrastructure::exchange::MockExchangeClient;
    use async_trait::async_trait;

    struct NullGovernorRepo;

    #[async_trait]
    impl GovernorRepository for NullGovernorRepo {
        async fn save(&self, _state: &crate::application::governor::GovernorState) -> anyhow::Result<()> {
            Ok(())
        }
        async fn load(&self) -> anyhow::Result<Option<crate::application::governor::GovernorState>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn collect_snapshot_reads_live_account_and_regime_state() {
        let exchange: Arc<dyn ExchangeClient> = Arc::new(MockExchangeClient::with_default_markets());
        let advisor = Arc::new(RuleBasedAdvisor::new("BTC"));
        let cfg = GovernorEnvConfig::default();
        let regime_detector = Arc::new(RegimeDetector::new(advisor, cfg.clone()));
        let governor = Arc::new(StrategyGovernor::load_or_init(Arc::new(NullGovernorRepo), cfg).await.unwrap());
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let metrics = Metrics::new().unwrap();
        let reporter = MetricsReporter::new(exchange, governor, regime_detector, cache, metrics, 60);

        let snapshot = reporter.collect_snapshot().await.expect("snapshot should collect");
        assert!(!snapshot.timestamp.is_empty());
        assert_eq!(snapshot.governor.active_plan_id, None);
    }
}
