//! The closed market-regime set and the feature record the detector and the
//! advisor's `classify_regime` both operate on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed regime set. Extending this requires a coordinated update of every
/// strategy descriptor's `compatible_regimes`/`avoid_regimes`, so it is fixed
/// here rather than left open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Regime {
    TrendingBull,
    TrendingBear,
    RangeBound,
    CarryFriendly,
    EventRisk,
}

impl Regime {
    pub const ALL: [Regime; 5] = [
        Regime::TrendingBull,
        Regime::TrendingBear,
        Regime::RangeBound,
        Regime::CarryFriendly,
        Regime::EventRisk,
    ];
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Regime::TrendingBull => "trending-bull",
            Regime::TrendingBear => "trending-bear",
            Regime::RangeBound => "range-bound",
            Regime::CarryFriendly => "carry-friendly",
            Regime::EventRisk => "event-risk",
        };
        write!(f, "{s}")
    }
}

/// Deterministic, reproducible input to regime classification. Built purely
/// from an `AccountState` + signal bundle so classification can be pinned in
/// tests independent of the advisor used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeSignals {
    pub adx: f64,
    pub sma_20: f64,
    pub sma_50: f64,
    pub realized_vol_24h: f64,
    pub weighted_funding: f64,
    pub avg_spread_bps: f64,
    pub avg_depth: f64,
}

impl Default for RegimeSignals {
    fn default() -> Self {
        Self {
            adx: 0.0,
            sma_20: 0.0,
            sma_50: 0.0,
            realized_vol_24h: 0.0,
            weighted_funding: 0.0,
            avg_spread_bps: 0.0,
            avg_depth: 0.0,
        }
    }
}

/// One entry in the detector's rolling classification history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeClassification {
    pub timestamp: DateTime<Utc>,
    pub regime: Regime,
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regime_display_matches_glossary_labels() {
        assert_eq!(Regime::TrendingBull.to_string(), "trending-bull");
        assert_eq!(Regime::EventRisk.to_string(), "event-risk");
    }

    #[test]
    fn all_regimes_enumerated() {
        assert_eq!(Regime::ALL.len(), 5);
    }
}
