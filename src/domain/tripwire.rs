//! Tripwire category/severity/action taxonomy. Generalizes the progressive
//! halt-level idea (normal/warning/reduced/full-halt by loss threshold) into
//! a wider table that also reacts to staleness, API failures, and
//! plan-specific invalidation rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripwireCategory {
    MarginRatio,
    LiquidationProximity,
    DailyLossLimit,
    DataStaleness,
    ApiFailures,
    PlanInvalidationTrigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripwireAction {
    FreezeNewRisk,
    InvalidatePlan,
    EscalateToSlowLoop,
    CutSizeToFloor,
}

impl TripwireCategory {
    /// The action prescribed for this category, per the fixed table — never
    /// left to be decided ad hoc at the call site.
    pub fn action(self) -> TripwireAction {
        match self {
            TripwireCategory::MarginRatio => TripwireAction::FreezeNewRisk,
            TripwireCategory::LiquidationProximity => TripwireAction::CutSizeToFloor,
            TripwireCategory::DailyLossLimit => TripwireAction::CutSizeToFloor,
            TripwireCategory::DataStaleness => TripwireAction::FreezeNewRisk,
            TripwireCategory::ApiFailures => TripwireAction::EscalateToSlowLoop,
            TripwireCategory::PlanInvalidationTrigger => TripwireAction::InvalidatePlan,
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            TripwireCategory::MarginRatio => Severity::Warning,
            TripwireCategory::LiquidationProximity => Severity::Critical,
            TripwireCategory::DailyLossLimit => Severity::Critical,
            TripwireCategory::DataStaleness => Severity::Warning,
            TripwireCategory::ApiFailures => Severity::Warning,
            TripwireCategory::PlanInvalidationTrigger => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripwireEvent {
    pub category: TripwireCategory,
    pub severity: Severity,
    pub action: TripwireAction,
    pub triggered_at: DateTime<Utc>,
    pub details: String,
}

impl TripwireEvent {
    pub fn new(category: TripwireCategory, details: impl Into<String>) -> Self {
        Self {
            category,
            severity: category.severity(),
            action: category.action(),
            triggered_at: Utc::now(),
            details: details.into(),
        }
    }
}

/// Thresholds the tripwire service evaluates against every fast-loop tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TripwireConfig {
    pub min_margin_ratio: f64,
    pub liquidation_proximity_threshold: f64,
    pub daily_loss_limit_pct: f64,
    pub max_data_staleness_seconds: f64,
    pub max_api_failure_count: u32,
}

impl Default for TripwireConfig {
    fn default() -> Self {
        Self {
            min_margin_ratio: 0.15,
            liquidation_proximity_threshold: 0.25,
            daily_loss_limit_pct: 0.05,
            max_data_staleness_seconds: 300.0,
            max_api_failure_count: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_action_table_is_fixed() {
        assert_eq!(TripwireCategory::LiquidationProximity.action(), TripwireAction::CutSizeToFloor);
        assert_eq!(TripwireCategory::DailyLossLimit.action(), TripwireAction::CutSizeToFloor);
        assert_eq!(TripwireCategory::ApiFailures.action(), TripwireAction::EscalateToSlowLoop);
        assert_eq!(TripwireCategory::PlanInvalidationTrigger.action(), TripwireAction::InvalidatePlan);
    }

    #[test]
    fn critical_severities_reserved_for_loss_and_liquidation() {
        assert_eq!(TripwireCategory::LiquidationProximity.severity(), Severity::Critical);
        assert_eq!(TripwireCategory::DailyLossLimit.severity(), Severity::Critical);
        assert_eq!(TripwireCategory::MarginRatio.severity(), Severity::Warning);
    }
}
