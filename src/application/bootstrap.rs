//! Top-level wiring: builds every collaborator from `GovernorConfig` and
//! assembles the `Runtime` the CLI commands and the scheduler both operate
//! on. One constructor that owns the whole dependency graph so nothing
//! downstream has to reach for a global.

use std::sync::Arc;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::application::cache::Cache;
use crate::application::governor::StrategyGovernor;
use crate::application::market_registry::MarketRegistry;
use crate::application::orchestrator::SignalOrchestrator;
use crate::application::providers::exchange_provider::ExchangeProvider;
use crate::application::providers::external_market_provider::MarketContextProvider;
use crate::application::providers::onchain_provider::OnChainDataProvider;
use crate::application::providers::sentiment_provider::FearGreedProvider;
use crate::application::regime_detector::RegimeDetector;
use crate::application::rule_based_advisor::RuleBasedAdvisor;
use crate::application::scheduler::Scheduler;
use crate::application::snapshot_writer::SnapshotWriter;
use crate::application::tripwire_service::TripwireService;
use crate::config::GovernorConfig;
use crate::domain::ports::{ExchangeClient, StrategyAdvisor};
use crate::domain::rebalancer::RebalanceConstraints;
use crate::domain::tripwire::TripwireConfig;
use crate::infrastructure::exchange::MockExchangeClient;
use crate::infrastructure::market_context::{MockExternalMarketProvider, MockOnChainProvider, MockSentimentProvider};
use crate::infrastructure::persistence::{Database, SqliteCache, SqliteGovernorRepository, SqliteSnapshotRepository};

/// The fully wired set of collaborators. Owns every `Arc` the CLI commands
/// and the scheduler need; nothing outside this struct holds a second copy
/// of the governor or the regime detector, so there is exactly one writer.
pub struct Runtime {
    pub exchange: Arc<dyn ExchangeClient>,
    pub advisor: Arc<dyn StrategyAdvisor>,
    pub cache: Arc<dyn Cache>,
    pub registry: Arc<MarketRegistry>,
    pub orchestrator: Arc<SignalOrchestrator>,
    pub regime_detector: Arc<RegimeDetector>,
    pub governor: Arc<StrategyGovernor>,
    pub tripwire: Arc<TripwireService>,
    pub snapshot_writer: Arc<SnapshotWriter>,
    pub scheduler: Arc<Scheduler>,
}

fn rebalance_constraints(cfg: &GovernorConfig) -> RebalanceConstraints {
    RebalanceConstraints {
        min_trade_value: cfg.risk.min_trade_value,
        rebalance_threshold: Decimal::from_f64(cfg.risk.rebalance_threshold).unwrap_or_default(),
        fee_bps: cfg.risk.fee_bps,
    }
}

fn tripwire_config(cfg: &GovernorConfig) -> TripwireConfig {
    TripwireConfig {
        min_margin_ratio: cfg.risk.min_margin_ratio,
        liquidation_proximity_threshold: cfg.risk.liquidation_proximity_threshold,
        daily_loss_limit_pct: cfg.risk.daily_loss_limit_pct,
        max_data_staleness_seconds: cfg.risk.max_data_staleness_seconds,
        max_api_failure_count: cfg.risk.max_api_failure_count,
    }
}

impl Runtime {
    /// Builds the runtime against a deterministic in-memory exchange and
    /// SQLite-backed persistence at `cfg.database_url`. The governance loop
    /// never ships a live venue adapter (out of scope); `MockExchangeClient`
    /// is the one exchange collaborator, exercised by `backtest` and
    /// `start` alike.
    pub async fn build(cfg: &GovernorConfig) -> anyhow::Result<Self> {
        let db = Database::new(&cfg.database_url).await?;

        let exchange: Arc<dyn ExchangeClient> = Arc::new(MockExchangeClient::with_default_markets());
        let cache: Arc<dyn Cache> = Arc::new(SqliteCache::new(db.clone()));

        let registry = Arc::new(MarketRegistry::new());
        registry.hydrate(exchange.as_ref()).await?;

        let exchange_provider = Arc::new(ExchangeProvider::new(exchange.clone(), cache.clone()));
        let onchain_provider = Arc::new(OnChainDataProvider::new(Arc::new(MockOnChainProvider), cache.clone()));
        let market_context_provider = Arc::new(MarketContextProvider::new(Arc::new(MockExternalMarketProvider::new()), cache.clone()));
        let sentiment_provider = Arc::new(FearGreedProvider::new(Arc::new(MockSentimentProvider::new()), cache.clone()));

        let orchestrator = Arc::new(SignalOrchestrator::new(
            exchange_provider.clone(),
            onchain_provider,
            market_context_provider,
            sentiment_provider,
        ));

        // No live LLM credentials are wired in this crate (out of scope,
        // §6.2) — the rule-based advisor is the one shipped `StrategyAdvisor`
        // and is an accepted substitute per the collaborator's own contract.
        let advisor: Arc<dyn StrategyAdvisor> = Arc::new(RuleBasedAdvisor::new("BTC"));

        let regime_detector = Arc::new(RegimeDetector::new(advisor.clone(), cfg.governor.clone()));

        let governor_repo = Arc::new(SqliteGovernorRepository::new(db.clone()));
        let governor = Arc::new(StrategyGovernor::load_or_init(governor_repo, cfg.governor.clone()).await?);

        let tripwire = Arc::new(TripwireService::new(tripwire_config(cfg), governor.clone()));

        let snapshot_repo = Arc::new(SqliteSnapshotRepository::new(db));
        let snapshot_writer = Arc::new(SnapshotWriter::new(snapshot_repo, cfg.governor.snapshot_retain_count));

        let scheduler = Arc::new(Scheduler::new(
            exchange.clone(),
            advisor.clone(),
            orchestrator.clone(),
            exchange_provider,
            regime_detector.clone(),
            governor.clone(),
            tripwire.clone(),
            snapshot_writer.clone(),
            registry.clone(),
            cfg.governor.clone(),
            rebalance_constraints(cfg),
        ));

        Ok(Self {
            exchange,
            advisor,
            cache,
            registry,
            orchestrator,
            regime_detector,
            governor,
            tripwire,
            snapshot_writer,
            scheduler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GovernorConfig {
        GovernorConfig {
            exchange: crate::config::ExchangeEnvConfig::default(),
            governor: crate::config::GovernorEnvConfig::default(),
            risk: crate::config::RiskEnvConfig::default(),
            observability: crate::config::ObservabilityEnvConfig::default(),
            llm_provider: None,
            llm_api_key: None,
            database_url: "sqlite::memory:".to_string(),
        }
    }

    #[tokio::test]
    async fn build_wires_every_collaborator_and_hydrates_the_registry() {
        let cfg = test_config();
        let runtime = Runtime::build(&cfg).await.expect("runtime should build");
        assert!(runtime.registry.get_size_decimals("BTC", crate::domain::types::MarketType::Perp).is_ok());
        let snapshot = runtime.governor.snapshot().await;
        assert!(snapshot.active_plan.is_none());
    }

    #[tokio::test]
    async fn build_is_idempotent_across_separate_databases() {
        let cfg = test_config();
        let first = Runtime::build(&cfg).await.unwrap();
        let second = Runtime::build(&cfg).await.unwrap();
        assert_eq!(first.governor.snapshot().await.rebalance_progress, second.governor.snapshot().await.rebalance_progress);
    }
}
