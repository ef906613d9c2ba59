//! The governor's primary entity: the active plan card, its risk budget, and
//! the decisions the governor renders over proposals.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::regime::Regime;
use crate::domain::types::TargetAllocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Active,
    Rebalancing,
    Retiring,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    Minutes,
    Hours,
    Days,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskBudget {
    pub max_leverage: Decimal,
    pub max_position_pct: Decimal,
    pub max_adverse_excursion_pct: Decimal,
    pub max_drawdown_pct: Decimal,
}

/// A strategy's static metadata: which regimes it is designed for, which it
/// must be pulled from, and the triggers that invalidate it outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    pub strategy_id: String,
    pub strategy_version: String,
    pub compatible_regimes: HashSet<Regime>,
    pub avoid_regimes: HashSet<Regime>,
    pub invalidation_triggers: Vec<String>,
    pub intended_horizon: Horizon,
    pub minimum_dwell_minutes: i64,
    pub expected_switching_cost_bps: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanCard {
    pub plan_id: Uuid,
    pub strategy_id: String,
    pub strategy_version: String,
    pub status: PlanStatus,
    pub target_allocations: TargetAllocation,
    pub risk_budget: RiskBudget,
    pub compatible_regimes: HashSet<Regime>,
    pub avoid_regimes: HashSet<Regime>,
    pub invalidation_triggers: Vec<String>,
    pub intended_horizon: Horizon,
    pub minimum_dwell_minutes: i64,
    pub expected_switching_cost_bps: Decimal,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub rebalance_progress: f64,
    pub dwell_deadline: DateTime<Utc>,
    pub cooldown_deadline: DateTime<Utc>,
}

impl PlanCard {
    /// Build a freshly proposed (not yet activated) plan card from a
    /// strategy descriptor and its proposed target.
    pub fn propose(descriptor: &StrategyDescriptor, target_allocations: TargetAllocation, risk_budget: RiskBudget) -> Self {
        let now = Utc::now();
        Self {
            plan_id: Uuid::new_v4(),
            strategy_id: descriptor.strategy_id.clone(),
            strategy_version: descriptor.strategy_version.clone(),
            status: PlanStatus::Pending,
            target_allocations,
            risk_budget,
            compatible_regimes: descriptor.compatible_regimes.clone(),
            avoid_regimes: descriptor.avoid_regimes.clone(),
            invalidation_triggers: descriptor.invalidation_triggers.clone(),
            intended_horizon: descriptor.intended_horizon,
            minimum_dwell_minutes: descriptor.minimum_dwell_minutes,
            expected_switching_cost_bps: descriptor.expected_switching_cost_bps,
            created_at: now,
            activated_at: None,
            rebalance_progress: 0.0,
            dwell_deadline: now,
            cooldown_deadline: now,
        }
    }

    pub fn activate(&mut self, now: DateTime<Utc>, cooldown_after_change_minutes: i64) {
        self.status = PlanStatus::Active;
        self.activated_at = Some(now);
        self.dwell_deadline = now + chrono::Duration::minutes(self.minimum_dwell_minutes);
        self.cooldown_deadline = now + chrono::Duration::minutes(cooldown_after_change_minutes);
        self.rebalance_progress = 0.0;
    }
}

/// A single change-log entry recorded on every governor state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub from_plan_id: Option<Uuid>,
    pub to_plan_id: Option<Uuid>,
}

/// Hypothetical-performance tracking for a plan, whether active or shadowed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PlanMetrics {
    pub realized_pnl_bps: f64,
    pub adherence_pct: f64,
    pub cycles_observed: u64,
}

/// The outcome of `StrategyGovernor::evaluate_proposal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    Approved { plan_id: Uuid },
    Rejected { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::TargetAllocation;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn descriptor() -> StrategyDescriptor {
        StrategyDescriptor {
            strategy_id: "trend-follow-v1".into(),
            strategy_version: "1.0.0".into(),
            compatible_regimes: HashSet::from([Regime::TrendingBull]),
            avoid_regimes: HashSet::from([Regime::EventRisk]),
            invalidation_triggers: vec!["drawdown_exceeds_10pct".into()],
            intended_horizon: Horizon::Hours,
            minimum_dwell_minutes: 240,
            expected_switching_cost_bps: dec!(15),
        }
    }

    #[test]
    fn activation_sets_dwell_and_cooldown_deadlines() {
        let descriptor = descriptor();
        let target = TargetAllocation { allocations: HashMap::new(), strategy_id: None, reasoning: String::new() };
        let risk_budget = RiskBudget {
            max_leverage: dec!(3),
            max_position_pct: dec!(0.3),
            max_adverse_excursion_pct: dec!(0.1),
            max_drawdown_pct: dec!(0.15),
        };
        let mut plan = PlanCard::propose(&descriptor, target, risk_budget);
        let now = Utc::now();
        plan.activate(now, 30);
        assert_eq!(plan.status, PlanStatus::Active);
        assert_eq!(plan.dwell_deadline, now + chrono::Duration::minutes(240));
        assert_eq!(plan.cooldown_deadline, now + chrono::Duration::minutes(30));
        assert_eq!(plan.rebalance_progress, 0.0);
    }
}
