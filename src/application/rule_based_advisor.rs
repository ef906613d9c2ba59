//! A deterministic, rule-based `StrategyAdvisor` substitute for the LLM
//! collaborator: ADX/trend/funding thresholds in place of a model call.
//! Acceptable wherever the governance loop does not require the advisor's
//! judgment, per the collaborator's own "acceptable substitute" contract.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

use crate::domain::plan_card::{Horizon, PlanCard, RiskBudget, StrategyDescriptor};
use crate::domain::ports::{AdvisorResponse, StrategyAdvisor};
use crate::domain::regime::{Regime, RegimeSignals};
use crate::domain::types::{AccountState, TargetAllocation, CASH_COIN};

const TREND_ADX_THRESHOLD: f64 = 25.0;
const CARRY_FUNDING_THRESHOLD: f64 = 0.0005;
const EVENT_VOL_THRESHOLD: f64 = 0.08;

pub struct RuleBasedAdvisor {
    representative_coin: String,
}

impl RuleBasedAdvisor {
    pub fn new(representative_coin: impl Into<String>) -> Self {
        Self { representative_coin: representative_coin.into() }
    }

    fn rule_based_regime(signals: &RegimeSignals) -> Regime {
        if signals.realized_vol_24h > EVENT_VOL_THRESHOLD {
            return Regime::EventRisk;
        }
        if signals.adx >= TREND_ADX_THRESHOLD {
            return if signals.sma_20 >= signals.sma_50 { Regime::TrendingBull } else { Regime::TrendingBear };
        }
        if signals.weighted_funding.abs() >= CARRY_FUNDING_THRESHOLD {
            return Regime::CarryFriendly;
        }
        Regime::RangeBound
    }

    fn descriptor_for(&self, regime: Regime) -> StrategyDescriptor {
        let (compatible, avoid, dwell_minutes, horizon): (Vec<Regime>, Vec<Regime>, i64, Horizon) = match regime {
            Regime::TrendingBull | Regime::TrendingBear => (vec![regime], vec![Regime::EventRisk], 240, Horizon::Hours),
            Regime::CarryFriendly => (vec![Regime::CarryFriendly, Regime::RangeBound], vec![Regime::EventRisk], 1440, Horizon::Days),
            Regime::RangeBound => (vec![Regime::RangeBound], vec![Regime::EventRisk], 240, Horizon::Hours),
            Regime::EventRisk => (vec![Regime::EventRisk], vec![], 60, Horizon::Hours),
        };
        StrategyDescriptor {
            strategy_id: format!("rule-based-{regime}"),
            strategy_version: "1.0.0".to_string(),
            compatible_regimes: compatible.into_iter().collect(),
            avoid_regimes: avoid.into_iter().collect(),
            invalidation_triggers: vec![],
            intended_horizon: horizon,
            minimum_dwell_minutes: dwell_minutes,
            expected_switching_cost_bps: dec!(15),
        }
    }

    fn target_for(&self, regime: Regime) -> TargetAllocation {
        let mut allocations = HashMap::new();
        match regime {
            Regime::TrendingBull => {
                allocations.insert(self.representative_coin.clone(), dec!(0.6));
                allocations.insert(CASH_COIN.to_string(), dec!(0.4));
            }
            Regime::TrendingBear => {
                allocations.insert(CASH_COIN.to_string(), Decimal::ONE);
            }
            Regime::CarryFriendly => {
                allocations.insert(self.representative_coin.clone(), dec!(0.3));
                allocations.insert(CASH_COIN.to_string(), dec!(0.7));
            }
            Regime::RangeBound => {
                allocations.insert(self.representative_coin.clone(), dec!(0.2));
                allocations.insert(CASH_COIN.to_string(), dec!(0.8));
            }
            Regime::EventRisk => {
                allocations.insert(CASH_COIN.to_string(), Decimal::ONE);
            }
        }
        TargetAllocation { allocations, strategy_id: Some(format!("rule-based-{regime}")), reasoning: format!("rule-based allocation for {regime} regime") }
    }
}

#[async_trait]
impl StrategyAdvisor for RuleBasedAdvisor {
    async fn propose_plan(&self, _account: &AccountState, current_regime: Regime, active_plan: Option<&PlanCard>) -> anyhow::Result<AdvisorResponse> {
        if let Some(plan) = active_plan {
            if plan.compatible_regimes.contains(&current_regime) {
                return Ok(AdvisorResponse::Maintain);
            }
        }
        let descriptor = self.descriptor_for(current_regime);
        let target = self.target_for(current_regime);
        let risk_budget = RiskBudget { max_leverage: dec!(3), max_position_pct: dec!(0.6), max_adverse_excursion_pct: dec!(0.1), max_drawdown_pct: dec!(0.2) };
        let plan = PlanCard::propose(&descriptor, target, risk_budget);
        Ok(AdvisorResponse::Propose(Box::new(plan)))
    }

    async fn classify_regime(&self, signals: &RegimeSignals) -> anyhow::Result<Regime> {
        Ok(Self::rule_based_regime(signals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn high_adx_with_rising_sma_classifies_trending_bull() {
        let advisor = RuleBasedAdvisor::new("BTC");
        let signals = RegimeSignals { adx: 30.0, sma_20: 105.0, sma_50: 100.0, ..Default::default() };
        let regime = advisor.classify_regime(&signals).await.unwrap();
        assert_eq!(regime, Regime::TrendingBull);
    }

    #[tokio::test]
    async fn high_volatility_classifies_event_risk_regardless_of_trend() {
        let advisor = RuleBasedAdvisor::new("BTC");
        let signals = RegimeSignals { adx: 30.0, sma_20: 105.0, sma_50: 100.0, realized_vol_24h: 0.2, ..Default::default() };
        let regime = advisor.classify_regime(&signals).await.unwrap();
        assert_eq!(regime, Regime::EventRisk);
    }

    #[tokio::test]
    async fn propose_plan_maintains_when_active_plan_already_compatible() {
        let advisor = RuleBasedAdvisor::new("BTC");
        let descriptor = advisor.descriptor_for(Regime::TrendingBull);
        let target = advisor.target_for(Regime::TrendingBull);
        let risk_budget = RiskBudget { max_leverage: dec!(3), max_position_pct: dec!(0.6), max_adverse_excursion_pct: dec!(0.1), max_drawdown_pct: dec!(0.2) };
        let active = PlanCard::propose(&descriptor, target, risk_budget);
        let account = AccountState { portfolio_value: dec!(1000), available_balance: dec!(1000), positions: vec![], spot_balances: Default::default(), timestamp: chrono::Utc::now(), is_stale: false };
        let response = advisor.propose_plan(&account, Regime::TrendingBull, Some(&active)).await.unwrap();
        assert!(matches!(response, AdvisorResponse::Maintain));
    }
}
