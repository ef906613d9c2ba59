//! The loop scheduler: fast/medium/slow cadences over one shared set of
//! collaborators. Each due loop runs as its own `tokio::spawn` task so a
//! panic in one never takes down the others — the `JoinHandle` just
//! resolves to an error, which is logged and otherwise ignored. Within one
//! tick, due loops are awaited in slow → medium → fast order: later loops
//! may read what earlier loops in the same tick wrote (cached bundles),
//! even though each runs as an independent, crash-isolated task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::application::governor::StrategyGovernor;
use crate::application::market_registry::MarketRegistry;
use crate::application::orchestrator::{self, SignalOrchestrator};
use crate::application::providers::exchange_provider::ExchangeProvider;
use crate::application::regime_detector::{self, RegimeDetector};
use crate::application::rule_based_advisor::RuleBasedAdvisor;
use crate::application::snapshot_writer::{GovernorMeta, SnapshotWriter};
use crate::application::tripwire_service::TripwireService;
use crate::config::GovernorEnvConfig;
use crate::domain::plan_card::{Decision, PlanStatus};
use crate::domain::ports::{AdvisorResponse, ExchangeClient, OrderRequest, OrderSide, StrategyAdvisor};
use crate::domain::rebalancer::RebalanceConstraints;
use crate::domain::signals::{FastBundle, SlowBundle};
use crate::domain::tripwire::TripwireAction;
use crate::domain::types::{ActionType, MarketType, PortfolioState, TradeAction};

#[derive(Debug, Clone, Copy, Default)]
struct LastRun {
    fast: Option<DateTime<Utc>>,
    medium: Option<DateTime<Utc>>,
    slow: Option<DateTime<Utc>>,
}

/// Cached per-tick context later loops in the same tick may read.
#[derive(Default)]
struct TickCache {
    last_fast_bundle: Option<FastBundle>,
    last_slow_bundle: Option<SlowBundle>,
}

pub struct Scheduler {
    exchange: Arc<dyn ExchangeClient>,
    advisor: Arc<dyn StrategyAdvisor>,
    orchestrator: Arc<SignalOrchestrator>,
    exchange_provider: Arc<ExchangeProvider>,
    regime_detector: Arc<RegimeDetector>,
    governor: Arc<StrategyGovernor>,
    tripwire: Arc<TripwireService>,
    snapshot_writer: Arc<SnapshotWriter>,
    registry: Arc<MarketRegistry>,
    cfg: GovernorEnvConfig,
    rebalance_constraints: RebalanceConstraints,
    last_run: Mutex<LastRun>,
    cache: Mutex<TickCache>,
    tick: AtomicU64,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        advisor: Arc<dyn StrategyAdvisor>,
        orchestrator: Arc<SignalOrchestrator>,
        exchange_provider: Arc<ExchangeProvider>,
        regime_detector: Arc<RegimeDetector>,
        governor: Arc<StrategyGovernor>,
        tripwire: Arc<TripwireService>,
        snapshot_writer: Arc<SnapshotWriter>,
        registry: Arc<MarketRegistry>,
        cfg: GovernorEnvConfig,
        rebalance_constraints: RebalanceConstraints,
    ) -> Self {
        Self {
            exchange,
            advisor,
            orchestrator,
            exchange_provider,
            regime_detector,
            governor,
            tripwire,
            snapshot_writer,
            registry,
            cfg,
            rebalance_constraints,
            last_run: Mutex::new(LastRun::default()),
            cache: Mutex::new(TickCache::default()),
            tick: AtomicU64::new(0),
        }
    }

    /// Also usable with a rule-based advisor as the collaborator when no LLM
    /// credentials are configured.
    pub fn with_rule_based_advisor(self) -> Self {
        Self { advisor: Arc::new(RuleBasedAdvisor::new("BTC")), ..self }
    }

    /// Runs until `shutdown` flips to `true`. `sync_mode` runs each due loop
    /// directly on the current task (no crash isolation, for debugging);
    /// otherwise each due loop is spawned and joined before the next is due.
    pub async fn run(self: Arc<Self>, sync_mode: bool, shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                info!("shutdown requested, finishing current tick then exiting");
                break;
            }

            let now = Utc::now();
            let due = self.due_loops(now).await;

            if due.slow {
                self.run_due("slow", sync_mode, now, |s, n| Box::pin(s.run_slow(n))).await;
            }
            if due.medium {
                self.run_due("medium", sync_mode, now, |s, n| Box::pin(s.run_medium(n))).await;
            }
            if due.fast {
                self.run_due("fast", sync_mode, now, |s, n| Box::pin(s.run_fast(n))).await;
            }

            if !due.fast && !due.medium && !due.slow {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }

    async fn due_loops(&self, now: DateTime<Utc>) -> Due {
        let last = self.last_run.lock().await;
        Due {
            fast: last.fast.map(|t| (now - t).num_seconds() as u64 >= self.cfg.fast_loop_seconds).unwrap_or(true),
            medium: last.medium.map(|t| (now - t).num_seconds() as u64 >= self.cfg.medium_loop_seconds).unwrap_or(true),
            slow: last.slow.map(|t| (now - t).num_seconds() as u64 >= self.cfg.slow_loop_seconds).unwrap_or(true),
        }
    }

    async fn run_due<F>(self: &Arc<Self>, name: &'static str, sync_mode: bool, now: DateTime<Utc>, f: F)
    where
        F: FnOnce(Arc<Self>, DateTime<Utc>) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>,
    {
        if sync_mode {
            f(self.clone(), now).await;
        } else {
            let handle = tokio::spawn(f(self.clone(), now));
            if let Err(err) = handle.await {
                error!(loop_name = name, %err, "loop task panicked, isolating failure and continuing on schedule");
            }
        }
        let mut last = self.last_run.lock().await;
        match name {
            "fast" => last.fast = Some(now),
            "medium" => last.medium = Some(now),
            _ => last.slow = Some(now),
        }
    }

    async fn run_fast(self: Arc<Self>, now: DateTime<Utc>) {
        let tick = self.tick.fetch_add(1, Ordering::SeqCst);
        let account = match self.exchange.account_state().await {
            Ok(a) => a,
            Err(err) => {
                warn!(%err, "account_state fetch failed on fast loop");
                self.tripwire.record_api_failure();
                return;
            }
        };
        self.tripwire.record_api_success();

        let snapshot = self.governor.snapshot().await;
        let watchlist = orchestrator::build_watchlist(&account, snapshot.active_plan.as_ref());
        let timeout = std::time::Duration::from_secs(self.cfg.fast_loop_timeout_seconds);
        let fast_bundle = self.orchestrator.collect_fast(&watchlist, timeout).await;

        let invalidation_fired = snapshot
            .active_plan
            .as_ref()
            .map(|p| drawdown_trigger_fired(&account, p.risk_budget.max_adverse_excursion_pct))
            .unwrap_or(false);

        let events = self.tripwire.evaluate(&account, fast_bundle.metadata.timestamp, now, invalidation_fired);
        if !events.is_empty() {
            for event in &events {
                warn!(category = ?event.category, action = ?event.action, "tripwire fired");
            }
            self.tripwire.apply(&events, now).await;
        }

        let critical = TripwireService::any_critical(&events);
        if critical {
            let actions = TripwireService::cut_size_to_floor_actions(&account);
            self.execute_actions(&account, actions).await;
        } else if snapshot.active_plan.is_some() && snapshot.rebalance_progress < 1.0 {
            let freeze = events.iter().any(|e| e.action == TripwireAction::FreezeNewRisk);
            self.step_and_execute_rebalance(&account, &snapshot, freeze, now).await;
        }

        self.cache.lock().await.last_fast_bundle = Some(fast_bundle);

        let meta = GovernorMeta {
            active_plan_id: snapshot.active_plan.as_ref().map(|p| p.plan_id),
            rebalance_progress: snapshot.rebalance_progress,
            cooldown_deadline: snapshot.cooldown_deadline,
            shadow_portfolio_count: snapshot.shadow_portfolios.len(),
        };
        let regime = self.regime_detector.current_regime().await;
        self.snapshot_writer.write("fast", now, &account, snapshot.active_plan.as_ref(), meta, regime, tick).await;
    }

    async fn step_and_execute_rebalance(&self, account: &crate::domain::types::AccountState, _snapshot: &crate::application::governor::GovernorState, freeze_new_risk: bool, now: DateTime<Utc>) {
        let prices = self.price_map(account).await;
        let current = PortfolioState::from_account(account, &prices);
        let size_decimals: HashMap<String, u32> = prices
            .keys()
            .filter_map(|coin| self.registry.get_size_decimals(coin, MarketType::Perp).ok().map(|d| (coin.clone(), d)))
            .collect();
        let plan = self
            .governor
            .step_rebalance(&current, &prices, &size_decimals, &HashMap::new(), &self.rebalance_constraints, now)
            .await;
        let actions = if freeze_new_risk { TripwireService::filter_freeze_new_risk(plan.actions) } else { plan.actions };
        self.execute_actions(account, actions).await;
    }

    async fn price_map(&self, account: &crate::domain::types::AccountState) -> HashMap<String, Decimal> {
        let mut coins: Vec<String> = account.positions.iter().map(|p| p.coin.clone()).collect();
        if let Some(plan) = self.governor.snapshot().await.active_plan {
            coins.extend(plan.target_allocations.allocations.keys().cloned());
        }
        coins.sort();
        coins.dedup();

        let mut prices = HashMap::new();
        for coin in coins {
            if coin == crate::domain::types::CASH_COIN {
                continue;
            }
            let result = self.exchange_provider.order_book(&coin).await;
            if let Some(mid) = result.value.mid() {
                prices.insert(coin, mid);
            }
        }
        prices
    }

    /// Converts each `TradeAction` into an `OrderRequest`. `Close` actions
    /// carry no size of their own (a partial close has no well-defined size
    /// without the position itself); the currently open size is looked up
    /// from the account snapshot the action was derived from.
    async fn execute_actions(&self, account: &crate::domain::types::AccountState, actions: Vec<TradeAction>) {
        for action in actions {
            if action.action_type == ActionType::Hold {
                continue;
            }
            let size = match action.size {
                Some(size) => size,
                None => account.position(&action.coin, action.market_type).map(|p| p.size.abs()).unwrap_or(Decimal::ZERO),
            };
            if size.is_zero() {
                continue;
            }
            let request = OrderRequest {
                coin: action.coin.clone(),
                side: if action.action_type == ActionType::Buy { OrderSide::Buy } else { OrderSide::Sell },
                size,
                limit_price: action.limit_price,
                reduce_only: action.action_type == ActionType::Close || action.action_type == ActionType::Sell,
                post_only: false,
            };
            match self.exchange.place_order(request).await {
                Ok(result) if result.success => info!(coin = %action.coin, order_id = %result.order_id, "order placed"),
                Ok(result) => warn!(coin = %action.coin, error = ?result.error, "order rejected by venue"),
                Err(err) => {
                    warn!(coin = %action.coin, %err, "order placement failed");
                    self.tripwire.record_api_failure();
                }
            }
        }
    }

    async fn run_medium(self: Arc<Self>, now: DateTime<Utc>) {
        let account = match self.exchange.account_state().await {
            Ok(a) => a,
            Err(err) => {
                warn!(%err, "account_state fetch failed on medium loop");
                return;
            }
        };
        let snapshot = self.governor.snapshot().await;
        let watchlist = orchestrator::build_watchlist(&account, snapshot.active_plan.as_ref());
        let timeout = std::time::Duration::from_secs(self.cfg.medium_loop_timeout_seconds);
        let medium_bundle = self.orchestrator.collect_medium(&watchlist, timeout).await;

        let fast_bundle = self.cache.lock().await.last_fast_bundle.clone().unwrap_or_else(|| FastBundle {
            spreads_bps: HashMap::new(),
            order_book_depth: HashMap::new(),
            slippage_estimate_bps: HashMap::new(),
            short_term_volatility: 0.0,
            micro_pnl: 0.0,
            api_latency_ms: 0.0,
            metadata: crate::domain::signals::SignalQualityMetadata::fresh(Vec::new()),
        });

        let signals = regime_detector::derive_signals(&account, &fast_bundle, &medium_bundle);
        let upcoming_events = self.cache.lock().await.last_slow_bundle.clone().map(|b| b.macro_events_upcoming).unwrap_or_default();
        let current_regime = self.regime_detector.classify(signals, now, &upcoming_events).await;

        let response = match self.advisor.propose_plan(&account, current_regime, snapshot.active_plan.as_ref()).await {
            Ok(r) => r,
            Err(err) => {
                warn!(%err, "advisor propose_plan failed, holding current plan");
                return;
            }
        };

        if let AdvisorResponse::Propose(plan) = response {
            let event_locked = self.regime_detector.is_event_locked().await;
            let tripwire_override = snapshot
                .active_plan
                .as_ref()
                .map(|p| p.status == PlanStatus::Retiring)
                .unwrap_or(false);
            // Rule-based advisors carry no per-call edge estimate; a fixed
            // estimate clears the minimum-advantage floor for any compatible
            // proposal. An LLM-backed advisor would source this from its own
            // cost-tracked response instead.
            let expected_edge_bps = self.cfg.minimum_advantage_over_cost_bps + plan.expected_switching_cost_bps.to_string().parse::<f64>().unwrap_or(0.0) + 1.0;
            let decision = self
                .governor
                .evaluate_proposal(*plan, current_regime, medium_bundle.metadata.confidence, expected_edge_bps, 0.0, now, tripwire_override, event_locked)
                .await;
            match decision {
                Decision::Approved { plan_id } => info!(%plan_id, "governor approved new plan"),
                Decision::Rejected { reason } => info!(reason, "governor rejected proposed plan"),
            }
        }

        let latest = self.governor.snapshot().await;
        let meta = GovernorMeta {
            active_plan_id: latest.active_plan.as_ref().map(|p| p.plan_id),
            rebalance_progress: latest.rebalance_progress,
            cooldown_deadline: latest.cooldown_deadline,
            shadow_portfolio_count: latest.shadow_portfolios.len(),
        };
        self.snapshot_writer.write("medium", now, &account, latest.active_plan.as_ref(), meta, current_regime, self.tick.load(Ordering::SeqCst)).await;
    }

    async fn run_slow(self: Arc<Self>, now: DateTime<Utc>) {
        let account = match self.exchange.account_state().await {
            Ok(a) => a,
            Err(err) => {
                warn!(%err, "account_state fetch failed on slow loop");
                return;
            }
        };
        let snapshot = self.governor.snapshot().await;
        let watchlist = orchestrator::build_watchlist(&account, snapshot.active_plan.as_ref());
        let timeout = std::time::Duration::from_secs(self.cfg.slow_loop_timeout_seconds);
        let slow_bundle = self.orchestrator.collect_slow(&watchlist, &account, timeout).await;
        self.cache.lock().await.last_slow_bundle = Some(slow_bundle.clone());

        let regime = self.regime_detector.current_regime().await;
        let meta = GovernorMeta {
            active_plan_id: snapshot.active_plan.as_ref().map(|p| p.plan_id),
            rebalance_progress: snapshot.rebalance_progress,
            cooldown_deadline: snapshot.cooldown_deadline,
            shadow_portfolio_count: snapshot.shadow_portfolios.len(),
        };
        self.snapshot_writer.write("slow", now, &account, snapshot.active_plan.as_ref(), meta, regime, self.tick.load(Ordering::SeqCst)).await;
    }
}

struct Due {
    fast: bool,
    medium: bool,
    slow: bool,
}

fn drawdown_trigger_fired(account: &crate::domain::types::AccountState, max_adverse_excursion_pct: Decimal) -> bool {
    use rust_decimal::prelude::ToPrimitive;
    let unrealized: Decimal = account.positions.iter().map(|p| p.unrealized_pnl()).sum();
    if account.portfolio_value.is_zero() {
        return false;
    }
    let drawdown = (-unrealized / account.portfolio_value).to_f64().unwrap_or(0.0);
    drawdown > max_adverse_excursion_pct.to_f64().unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn drawdown_trigger_fires_past_max_adverse_excursion() {
        let position = crate::domain::types::Position {
            coin: "BTC".to_string(),
            market_type: MarketType::Perp,
            size: dec!(1),
            entry_price: dec!(60000),
            current_price: dec!(50000),
            leverage: Some(dec!(2)),
        };
        let account = crate::domain::types::AccountState {
            portfolio_value: dec!(50000),
            available_balance: dec!(40000),
            positions: vec![position],
            spot_balances: Default::default(),
            timestamp: Utc::now(),
            is_stale: false,
        };
        assert!(drawdown_trigger_fired(&account, dec!(0.1)));
    }

    #[test]
    fn drawdown_trigger_does_not_fire_within_budget() {
        let position = crate::domain::types::Position {
            coin: "BTC".to_string(),
            market_type: MarketType::Perp,
            size: dec!(1),
            entry_price: dec!(60000),
            current_price: dec!(59500),
            leverage: Some(dec!(2)),
        };
        let account = crate::domain::types::AccountState {
            portfolio_value: dec!(59500),
            available_balance: dec!(40000),
            positions: vec![position],
            spot_balances: Default::default(),
            timestamp: Utc::now(),
            is_stale: false,
        };
        assert!(!drawdown_trigger_fired(&account, dec!(0.1)));
    }
}
