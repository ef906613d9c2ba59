//! The regime detector: derives a deterministic `RegimeSignals` record from
//! an account/signal snapshot, delegates the actual label to a
//! `StrategyAdvisor::classify_regime` call, and only moves `current_regime`
//! once the hysteresis/confirmation rule is satisfied. A macro event lock can
//! freeze the current regime regardless of what the advisor says.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::RwLock;
use tracing::warn;

use crate::config::GovernorEnvConfig;
use crate::domain::ports::StrategyAdvisor;
use crate::domain::regime::{Regime, RegimeClassification, RegimeSignals};
use crate::domain::signals::{FastBundle, MacroEvent, MacroImpact, MediumBundle};
use crate::domain::types::AccountState;

/// Builds the deterministic feature record the detector classifies on. Pure:
/// no clock reads beyond what is already carried in the inputs, no I/O.
pub fn derive_signals(account: &AccountState, fast: &FastBundle, medium: &MediumBundle) -> RegimeSignals {
    let representative = medium
        .technical_indicators
        .contains_key("BTC")
        .then(|| "BTC".to_string())
        .or_else(|| {
            account
                .positions
                .iter()
                .max_by_key(|p| p.notional())
                .map(|p| p.coin.clone())
        })
        .or_else(|| medium.technical_indicators.keys().next().cloned());

    let (adx, sma_20, sma_50) = representative
        .as_ref()
        .and_then(|coin| medium.technical_indicators.get(coin))
        .map(|ind| {
            let valid = (0.0..=100.0).contains(&ind.adx) && ind.sma_20 > 0.0 && ind.sma_50 > 0.0;
            if valid { (ind.adx, ind.sma_20, ind.sma_50) } else { (0.0, 0.0, 0.0) }
        })
        .unwrap_or((0.0, 0.0, 0.0));

    let mut weighted_notional = rust_decimal::Decimal::ZERO;
    let mut weighted_sum = 0.0;
    for position in &account.positions {
        if let Some(rate) = medium.funding_basis.get(&position.coin) {
            let notional = position.notional();
            weighted_notional += notional;
            weighted_sum += notional.to_f64().unwrap_or(0.0) * rate;
        }
    }
    let weighted_funding = if weighted_notional.is_zero() { 0.0 } else { weighted_sum / weighted_notional.to_f64().unwrap_or(1.0) };

    let avg_spread_bps = mean(fast.spreads_bps.values().copied());
    let avg_depth = mean(fast.order_book_depth.values().copied());

    RegimeSignals {
        adx,
        sma_20,
        sma_50,
        realized_vol_24h: medium.realized_vol_24h,
        weighted_funding,
        avg_spread_bps,
        avg_depth,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Returns `true` if `now` falls within a high-impact macro event's lock
/// window: `[event.scheduled_at - before, event.scheduled_at + after]`.
fn event_locked(events: &[MacroEvent], now: DateTime<Utc>, before_hours: i64, after_hours: i64) -> bool {
    events.iter().any(|e| {
        e.impact == MacroImpact::High
            && now >= e.scheduled_at - chrono::Duration::hours(before_hours)
            && now <= e.scheduled_at + chrono::Duration::hours(after_hours)
    })
}

pub struct RegimeDetector {
    advisor: Arc<dyn StrategyAdvisor>,
    cfg: GovernorEnvConfig,
    state: RwLock<DetectorState>,
}

struct DetectorState {
    current_regime: Regime,
    history: VecDeque<RegimeClassification>,
    event_locked: bool,
}

impl RegimeDetector {
    pub fn new(advisor: Arc<dyn StrategyAdvisor>, cfg: GovernorEnvConfig) -> Self {
        Self {
            advisor,
            cfg,
            state: RwLock::new(DetectorState { current_regime: Regime::RangeBound, history: VecDeque::new(), event_locked: false }),
        }
    }

    pub async fn current_regime(&self) -> Regime {
        self.state.read().await.current_regime
    }

    pub async fn is_event_locked(&self) -> bool {
        self.state.read().await.event_locked
    }

    pub async fn history(&self, limit: usize) -> Vec<RegimeClassification> {
        let state = self.state.read().await;
        state.history.iter().rev().take(limit).cloned().collect()
    }

    /// Runs one classification cycle: derives signals, asks the advisor for
    /// a raw label, appends it to history, applies the event lock, then
    /// applies hysteresis to decide whether `current_regime` actually moves.
    pub async fn classify(&self, signals: RegimeSignals, now: DateTime<Utc>, upcoming_events: &[MacroEvent]) -> Regime {
        let raw = match self.advisor.classify_regime(&signals).await {
            Ok(regime) => regime,
            Err(err) => {
                warn!(%err, "advisor regime classification failed, holding previous regime");
                return self.current_regime().await;
            }
        };

        if !Regime::ALL.contains(&raw) {
            warn!(?raw, "advisor returned a label outside the closed regime set, holding previous regime");
            return self.current_regime().await;
        }

        let mut state = self.state.write().await;
        state.event_locked = event_locked(upcoming_events, now, self.cfg.event_lock_before_hours, self.cfg.event_lock_after_hours);

        state.history.push_back(RegimeClassification { timestamp: now, regime: raw, confidence: 1.0 });
        while state.history.len() > self.cfg.regime_history_capacity {
            state.history.pop_front();
        }

        if state.event_locked {
            return state.current_regime;
        }

        let window: Vec<Regime> = state.history.iter().rev().take(self.cfg.confirmation_cycles_required).map(|c| c.regime).collect();
        if window.len() < self.cfg.confirmation_cycles_required {
            return state.current_regime;
        }

        let candidate_share = window.iter().filter(|r| **r == raw).count() as f64 / window.len() as f64;
        let current = state.current_regime;
        if raw != current {
            // Entering a new regime outright (strong consensus on the candidate) or
            // exiting the current one on a weaker majority-of-non-current reading —
            // either is sufficient, and either way the new current regime is the raw label.
            let non_current_share = window.iter().filter(|r| **r != current).count() as f64 / window.len() as f64;
            if candidate_share >= self.cfg.hysteresis_enter_threshold || non_current_share >= (1.0 - self.cfg.hysteresis_exit_threshold) {
                state.current_regime = raw;
            }
        }

        state.current_regime
    }
}

#[async_trait::async_trait]
impl crate::domain::ports::RegimeHistoryReader for RegimeDetector {
    async fn current_regime(&self) -> Regime {
        self.state.read().await.current_regime
    }

    async fn is_event_locked(&self) -> bool {
        self.state.read().await.event_locked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan_card::PlanCard;
    use crate::domain::ports::AdvisorResponse;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct ScriptedAdvisor(StdMutex<VecDeque<Regime>>);

    #[async_trait]
    impl StrategyAdvisor for ScriptedAdvisor {
        async fn propose_plan(&self, _account: &AccountState, _current_regime: Regime, _active_plan: Option<&PlanCard>) -> anyhow::Result<AdvisorResponse> {
            Ok(AdvisorResponse::Maintain)
        }

        async fn classify_regime(&self, _signals: &RegimeSignals) -> anyhow::Result<Regime> {
            Ok(self.0.lock().unwrap().pop_front().unwrap_or(Regime::RangeBound))
        }
    }

    fn detector(script: Vec<Regime>) -> RegimeDetector {
        let advisor = Arc::new(ScriptedAdvisor(StdMutex::new(script.into())));
        RegimeDetector::new(advisor, GovernorEnvConfig::default())
    }

    // S4: regime confirmation/hysteresis — a single off-label blip does not flip the regime.
    #[tokio::test]
    async fn s4_single_blip_does_not_flip_regime_before_confirmation() {
        let det = detector(vec![Regime::RangeBound, Regime::RangeBound, Regime::TrendingBull, Regime::RangeBound, Regime::RangeBound]);
        let now = Utc::now();
        for _ in 0..5 {
            det.classify(RegimeSignals::default(), now, &[]).await;
        }
        assert_eq!(det.current_regime().await, Regime::RangeBound);
    }

    #[tokio::test]
    async fn s4_sustained_label_flips_regime_after_confirmation_cycles() {
        let det = detector(vec![Regime::TrendingBull, Regime::TrendingBull, Regime::TrendingBull, Regime::TrendingBull]);
        let now = Utc::now();
        for _ in 0..3 {
            det.classify(RegimeSignals::default(), now, &[]).await;
        }
        assert_eq!(det.current_regime().await, Regime::TrendingBull);
    }

    // S4 (full round-trip): after confirming trending-bull, a single range-bound
    // reading doesn't flip back (non-current share 1/3 < exit threshold 0.6), but a
    // second consecutive range-bound reading does (non-current share 2/3 >= 0.6),
    // even though the candidate's own share (2/3) stays below the 0.7 enter threshold.
    #[tokio::test]
    async fn s4_exits_current_regime_on_majority_non_current_without_meeting_enter_threshold() {
        let det = detector(vec![
            Regime::TrendingBull,
            Regime::TrendingBull,
            Regime::TrendingBull,
            Regime::RangeBound,
            Regime::RangeBound,
        ]);
        let now = Utc::now();
        for _ in 0..3 {
            det.classify(RegimeSignals::default(), now, &[]).await;
        }
        assert_eq!(det.current_regime().await, Regime::TrendingBull);

        det.classify(RegimeSignals::default(), now, &[]).await;
        assert_eq!(det.current_regime().await, Regime::TrendingBull, "single off-label reading must not flip the regime");

        det.classify(RegimeSignals::default(), now, &[]).await;
        assert_eq!(det.current_regime().await, Regime::RangeBound, "sustained majority non-current readings must exit the regime");
    }

    #[tokio::test]
    async fn event_lock_freezes_regime_around_high_impact_event() {
        let det = detector(vec![Regime::TrendingBull, Regime::TrendingBull, Regime::TrendingBull]);
        let now = Utc::now();
        let events = vec![MacroEvent { name: "FOMC".to_string(), scheduled_at: now + chrono::Duration::minutes(30), impact: MacroImpact::High }];
        for _ in 0..3 {
            det.classify(RegimeSignals::default(), now, &events).await;
        }
        assert_eq!(det.current_regime().await, Regime::RangeBound);
        assert!(det.is_event_locked().await);
    }

    #[tokio::test]
    async fn unknown_label_outside_closed_set_is_rejected_by_construction() {
        // Regime is a closed Rust enum; every advisor response already type-checks
        // into one of the five variants, so Regime::ALL.contains always holds. This
        // test pins that invariant rather than exercising a runtime failure path.
        for r in Regime::ALL {
            assert!(Regime::ALL.contains(&r));
        }
    }

    #[test]
    fn derive_signals_defaults_to_zero_with_no_positions_or_indicators() {
        let account = AccountState {
            portfolio_value: Default::default(),
            available_balance: Default::default(),
            positions: vec![],
            spot_balances: Default::default(),
            timestamp: Utc::now(),
            is_stale: false,
        };
        let fast = FastBundle {
            spreads_bps: Default::default(),
            order_book_depth: Default::default(),
            slippage_estimate_bps: Default::default(),
            short_term_volatility: 0.0,
            micro_pnl: Default::default(),
            api_latency_ms: 0.0,
            metadata: crate::domain::signals::SignalQualityMetadata::fresh(Default::default()),
        };
        let medium = MediumBundle {
            realized_vol_1h: 0.0,
            realized_vol_24h: 0.0,
            trend_score: 0.0,
            funding_basis: Default::default(),
            funding_rate_trend: Default::default(),
            open_interest_change_24h: Default::default(),
            oi_to_volume_ratio: 0.0,
            technical_indicators: Default::default(),
            metadata: crate::domain::signals::SignalQualityMetadata::fresh(Default::default()),
        };
        let signals = derive_signals(&account, &fast, &medium);
        assert_eq!(signals, RegimeSignals::default());
    }
}
