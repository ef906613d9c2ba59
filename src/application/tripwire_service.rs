//! The tripwire service: a safety monitor independent of the governor and
//! the advisor, evaluated every fast loop against a fixed six-category
//! table. Evaluation itself is a pure, synchronous computation — no
//! suspension points — so it can run on the fast loop's deadline without
//! competing with provider I/O. Only applying a fired `invalidate_plan`
//! action needs to go back out to the governor, through the narrow
//! `PlanInvalidator` seam rather than a concrete reference.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::errors::RiskViolation;
use crate::domain::ports::PlanInvalidator;
use crate::domain::tripwire::{TripwireCategory, TripwireConfig, TripwireEvent};
use crate::domain::types::{ActionType, AccountState, MarketType, TradeAction};

/// Tracks the account value at the start of the current trading day, reset
/// whenever the calendar day (UTC) rolls over.
struct DailyBaseline {
    equity: Decimal,
    day: chrono::NaiveDate,
}

pub struct TripwireService {
    config: TripwireConfig,
    invalidator: Arc<dyn PlanInvalidator>,
    api_failure_count: AtomicU32,
    daily_baseline: Mutex<Option<DailyBaseline>>,
}

impl TripwireService {
    pub fn new(config: TripwireConfig, invalidator: Arc<dyn PlanInvalidator>) -> Self {
        Self { config, invalidator, api_failure_count: AtomicU32::new(0), daily_baseline: Mutex::new(None) }
    }

    pub fn record_api_failure(&self) {
        self.api_failure_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_api_success(&self) {
        self.api_failure_count.store(0, Ordering::SeqCst);
    }

    fn day_start_equity(&self, account: &AccountState) -> Decimal {
        let today = account.timestamp.date_naive();
        let mut baseline = self.daily_baseline.lock().unwrap();
        match baseline.as_ref() {
            Some(b) if b.day == today => b.equity,
            _ => {
                *baseline = Some(DailyBaseline { equity: account.portfolio_value, day: today });
                account.portfolio_value
            }
        }
    }

    /// Estimates a perp position's liquidation price from its entry price
    /// and leverage, since the account snapshot does not carry the
    /// exchange's own maintenance-margin figure. Long positions liquidate
    /// below entry, shorts above; spot/unleveraged positions never trigger
    /// this category.
    fn estimated_liquidation_price(position: &crate::domain::types::Position) -> Option<Decimal> {
        let leverage = position.leverage?;
        if position.market_type != MarketType::Perp || leverage <= Decimal::ONE {
            return None;
        }
        let maintenance_fraction = Decimal::ONE / leverage;
        if position.size.is_sign_positive() {
            Some(position.entry_price * (Decimal::ONE - maintenance_fraction))
        } else {
            Some(position.entry_price * (Decimal::ONE + maintenance_fraction))
        }
    }

    /// Evaluates the fixed category table against one account/signal
    /// snapshot. Pure: takes no lock across an `.await`, performs no I/O.
    pub fn evaluate(
        &self,
        account: &AccountState,
        signals_timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
        plan_invalidation_triggered: bool,
    ) -> Vec<TripwireEvent> {
        let mut events = Vec::new();

        let margin_ratio = account.margin_ratio();
        if margin_ratio.to_f64().unwrap_or(1.0) < self.config.min_margin_ratio {
            let violation = RiskViolation::MarginRatioBreach { current: margin_ratio, min: Decimal::from_f64_retain(self.config.min_margin_ratio).unwrap_or_default() };
            events.push(TripwireEvent::new(TripwireCategory::MarginRatio, violation.to_string()));
        }

        for position in &account.positions {
            if let Some(liq_price) = Self::estimated_liquidation_price(position) {
                if position.current_price.is_zero() {
                    continue;
                }
                let proximity = ((position.current_price - liq_price) / position.current_price).abs().to_f64().unwrap_or(1.0);
                if proximity < self.config.liquidation_proximity_threshold {
                    let violation = RiskViolation::LiquidationProximity { proximity_pct: proximity * 100.0, threshold_pct: self.config.liquidation_proximity_threshold * 100.0 };
                    events.push(TripwireEvent::new(TripwireCategory::LiquidationProximity, format!("{coin}: {violation}", coin = position.coin)));
                    break;
                }
            }
        }

        let day_start = self.day_start_equity(account);
        if !day_start.is_zero() {
            let loss_pct = ((day_start - account.portfolio_value) / day_start).to_f64().unwrap_or(0.0);
            if loss_pct > self.config.daily_loss_limit_pct {
                let violation = RiskViolation::DailyLossLimit { loss_pct: loss_pct * 100.0, limit_pct: self.config.daily_loss_limit_pct * 100.0 };
                events.push(TripwireEvent::new(TripwireCategory::DailyLossLimit, violation.to_string()));
            }
        }

        let staleness_seconds = (now - signals_timestamp).num_milliseconds() as f64 / 1000.0;
        if staleness_seconds > self.config.max_data_staleness_seconds {
            events.push(TripwireEvent::new(
                TripwireCategory::DataStaleness,
                format!("signals are {staleness_seconds:.0}s old, limit {:.0}s", self.config.max_data_staleness_seconds),
            ));
        }

        let failures = self.api_failure_count.load(Ordering::SeqCst);
        if failures >= self.config.max_api_failure_count {
            events.push(TripwireEvent::new(TripwireCategory::ApiFailures, format!("{failures} consecutive provider failures")));
        }

        if plan_invalidation_triggered {
            events.push(TripwireEvent::new(TripwireCategory::PlanInvalidationTrigger, "active plan invalidation trigger matched".to_string()));
        }

        events
    }

    /// Carries out whatever an invalidate_plan event prescribes. The other
    /// actions (freeze_new_risk, cut_size_to_floor, escalate_to_slow_loop)
    /// are read by the scheduler/executor directly off the returned events;
    /// only plan invalidation needs a call back out of this service.
    pub async fn apply(&self, events: &[TripwireEvent], now: DateTime<Utc>) {
        for event in events {
            if event.action == crate::domain::tripwire::TripwireAction::InvalidatePlan {
                warn!(category = ?event.category, "tripwire invalidating active plan");
                self.invalidator.invalidate_plan(event.details.clone(), now).await;
            }
        }
    }

    /// `cut_size_to_floor`: a reduce-only market close for every nonzero
    /// position, first-class rather than a placeholder.
    pub fn cut_size_to_floor_actions(account: &AccountState) -> Vec<TradeAction> {
        account
            .positions
            .iter()
            .filter(|p| !p.size.is_zero())
            .map(|p| TradeAction {
                action_type: ActionType::Close,
                coin: p.coin.clone(),
                market_type: p.market_type,
                size: None,
                limit_price: None,
                reasoning: "tripwire liquidation_proximity/daily_loss_limit breach".to_string(),
            })
            .collect()
    }

    /// `freeze_new_risk`: strips any action that would open or add to
    /// exposure, leaving sells/closes untouched.
    pub fn filter_freeze_new_risk(actions: Vec<TradeAction>) -> Vec<TradeAction> {
        actions.into_iter().filter(|a| a.action_type != ActionType::Buy).collect()
    }

    pub fn any_critical(events: &[TripwireEvent]) -> bool {
        events.iter().any(|e| e.severity == crate::domain::tripwire::Severity::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Position;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex as StdMutex;

    struct RecordingInvalidator(StdMutex<Vec<String>>);

    #[async_trait]
    impl PlanInvalidator for RecordingInvalidator {
        async fn invalidate_plan(&self, reason: String, _now: DateTime<Utc>) {
            self.0.lock().unwrap().push(reason);
        }
    }

    fn account(portfolio_value: Decimal, available_balance: Decimal, positions: Vec<Position>) -> AccountState {
        AccountState { portfolio_value, available_balance, positions, spot_balances: Default::default(), timestamp: Utc::now(), is_stale: false }
    }

    #[test]
    fn margin_ratio_below_minimum_fires_warning() {
        let invalidator = Arc::new(RecordingInvalidator(StdMutex::new(Vec::new())));
        let svc = TripwireService::new(TripwireConfig::default(), invalidator);
        let acct = account(dec!(10000), dec!(500), vec![]);
        let events = svc.evaluate(&acct, Utc::now(), Utc::now(), false);
        assert!(events.iter().any(|e| e.category == TripwireCategory::MarginRatio));
    }

    #[test]
    fn liquidation_proximity_breach_detected_for_leveraged_long() {
        let invalidator = Arc::new(RecordingInvalidator(StdMutex::new(Vec::new())));
        let svc = TripwireService::new(TripwireConfig::default(), invalidator);
        let position = Position { coin: "BTC".to_string(), market_type: MarketType::Perp, size: dec!(1), entry_price: dec!(60000), current_price: dec!(50100), leverage: Some(dec!(5)) };
        // liq price ~= 60000 * (1 - 1/5) = 48000; proximity = (50100-48000)/50100 ~= 4.2%, below 25% threshold.
        let acct = account(dec!(50000), dec!(40000), vec![position]);
        let events = svc.evaluate(&acct, Utc::now(), Utc::now(), false);
        assert!(events.iter().any(|e| e.category == TripwireCategory::LiquidationProximity));
        assert!(TripwireService::any_critical(&events));
    }

    #[test]
    fn data_staleness_over_threshold_fires() {
        let invalidator = Arc::new(RecordingInvalidator(StdMutex::new(Vec::new())));
        let svc = TripwireService::new(TripwireConfig::default(), invalidator);
        let acct = account(dec!(10000), dec!(10000), vec![]);
        let now = Utc::now();
        let stale_signals = now - chrono::Duration::seconds(400);
        let events = svc.evaluate(&acct, stale_signals, now, false);
        assert!(events.iter().any(|e| e.category == TripwireCategory::DataStaleness));
    }

    #[test]
    fn api_failures_fires_after_consecutive_threshold() {
        let invalidator = Arc::new(RecordingInvalidator(StdMutex::new(Vec::new())));
        let svc = TripwireService::new(TripwireConfig::default(), invalidator);
        for _ in 0..3 {
            svc.record_api_failure();
        }
        let acct = account(dec!(10000), dec!(10000), vec![]);
        let events = svc.evaluate(&acct, Utc::now(), Utc::now(), false);
        assert!(events.iter().any(|e| e.category == TripwireCategory::ApiFailures));
    }

    #[test]
    fn api_success_resets_failure_counter() {
        let invalidator = Arc::new(RecordingInvalidator(StdMutex::new(Vec::new())));
        let svc = TripwireService::new(TripwireConfig::default(), invalidator);
        svc.record_api_failure();
        svc.record_api_failure();
        svc.record_api_success();
        let acct = account(dec!(10000), dec!(10000), vec![]);
        let events = svc.evaluate(&acct, Utc::now(), Utc::now(), false);
        assert!(!events.iter().any(|e| e.category == TripwireCategory::ApiFailures));
    }

    // S6: tripwire override — a fired invalidate_plan event must reach the governor
    // seam and clear the way for the next proposal to be reviewed mid-dwell.
    #[tokio::test]
    async fn s6_plan_invalidation_trigger_calls_through_to_invalidator() {
        let invalidator = Arc::new(RecordingInvalidator(StdMutex::new(Vec::new())));
        let svc = TripwireService::new(TripwireConfig::default(), invalidator.clone());
        let acct = account(dec!(10000), dec!(10000), vec![]);
        let now = Utc::now();
        let events = svc.evaluate(&acct, now, now, true);
        assert!(events.iter().any(|e| e.category == TripwireCategory::PlanInvalidationTrigger));
        svc.apply(&events, now).await;
        assert_eq!(invalidator.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn cut_size_to_floor_emits_close_for_every_nonzero_position() {
        let positions = vec![
            Position { coin: "BTC".to_string(), market_type: MarketType::Perp, size: dec!(1), entry_price: dec!(60000), current_price: dec!(61000), leverage: Some(dec!(3)) },
            Position { coin: "ETH".to_string(), market_type: MarketType::Perp, size: dec!(0), entry_price: dec!(3000), current_price: dec!(3000), leverage: None },
        ];
        let acct = account(dec!(60000), dec!(20000), positions);
        let actions = TripwireService::cut_size_to_floor_actions(&acct);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Close);
        assert_eq!(actions[0].coin, "BTC");
    }

    #[test]
    fn freeze_new_risk_strips_buys_but_keeps_sells_and_closes() {
        let actions = vec![
            TradeAction { action_type: ActionType::Buy, coin: "BTC".to_string(), market_type: MarketType::Perp, size: Some(dec!(1)), limit_price: None, reasoning: String::new() },
            TradeAction { action_type: ActionType::Sell, coin: "ETH".to_string(), market_type: MarketType::Perp, size: Some(dec!(1)), limit_price: None, reasoning: String::new() },
            TradeAction { action_type: ActionType::Close, coin: "SOL".to_string(), market_type: MarketType::Perp, size: None, limit_price: None, reasoning: String::new() },
        ];
        let filtered = TripwireService::filter_freeze_new_risk(actions);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|a| a.action_type != ActionType::Buy));
    }
}
