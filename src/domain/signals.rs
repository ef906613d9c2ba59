//! The three signal bundles the orchestrator produces (fast/medium/slow) and
//! the supporting structured records each carries.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider identifiers a bundle's `metadata.sources` may contain. Fixed set,
/// one entry per collaborator in §4.3 — never a coin ticker.
pub const PROVIDER_EXCHANGE: &str = "exchange";
pub const PROVIDER_ONCHAIN: &str = "onchain";
pub const PROVIDER_EXTERNAL_MARKET: &str = "external_market";
pub const PROVIDER_SENTIMENT: &str = "sentiment";

pub const KNOWN_PROVIDERS: [&str; 4] = [PROVIDER_EXCHANGE, PROVIDER_ONCHAIN, PROVIDER_EXTERNAL_MARKET, PROVIDER_SENTIMENT];

/// Confidence/provenance metadata attached to every bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalQualityMetadata {
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    pub staleness_seconds: f64,
    pub sources: Vec<String>,
    pub is_cached: bool,
}

impl SignalQualityMetadata {
    pub fn fresh(sources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            confidence: 1.0,
            staleness_seconds: 0.0,
            sources,
            is_cached: false,
        }
    }

    /// Confidence contribution when `expected` sources were requested and
    /// only `succeeded` came back fresh (uncached, unfailed).
    pub fn downweight_for_missing(expected: usize, succeeded: usize) -> f64 {
        if expected == 0 {
            return 1.0;
        }
        (succeeded as f64 / expected as f64).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

/// Per-coin technical indicator snapshot, computed only once at least 50
/// candles are available; otherwise left `None` and confidence is
/// downweighted by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TechnicalIndicators {
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    pub bb_position: f64,
    pub sma_20: f64,
    pub sma_50: f64,
    pub ema_12: f64,
    pub ema_26: f64,
    pub adx: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidityRegime {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroImpact {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroEvent {
    pub name: String,
    pub scheduled_at: DateTime<Utc>,
    pub impact: MacroImpact,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WhaleFlow {
    pub inflow: f64,
    pub outflow: f64,
    pub net: f64,
    pub tx_count: u64,
}

/// Fast-cadence bundle: order-book-derived microstructure, target latency
/// ≤ 1s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastBundle {
    pub spreads_bps: HashMap<String, f64>,
    pub order_book_depth: HashMap<String, f64>,
    pub slippage_estimate_bps: HashMap<String, f64>,
    pub short_term_volatility: f64,
    pub micro_pnl: f64,
    pub api_latency_ms: f64,
    pub metadata: SignalQualityMetadata,
}

/// Medium-cadence bundle: technicals and funding/OI trend, target latency
/// ≤ 5s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediumBundle {
    pub realized_vol_1h: f64,
    pub realized_vol_24h: f64,
    pub trend_score: f64,
    pub funding_basis: HashMap<String, f64>,
    pub funding_rate_trend: HashMap<String, Trend>,
    pub open_interest_change_24h: HashMap<String, f64>,
    pub oi_to_volume_ratio: f64,
    pub technical_indicators: HashMap<String, TechnicalIndicators>,
    pub metadata: SignalQualityMetadata,
}

/// Slow-cadence bundle: macro/cross-asset context, target latency ≤ 15s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowBundle {
    pub macro_events_upcoming: Vec<MacroEvent>,
    pub cross_asset_risk_on_score: f64,
    pub venue_health_score: f64,
    pub liquidity_regime: LiquidityRegime,
    pub btc_eth_correlation: f64,
    pub btc_spx_correlation: Option<f64>,
    pub fear_greed_index: f64,
    pub token_unlocks_7d: HashMap<String, f64>,
    pub whale_flow_24h: HashMap<String, WhaleFlow>,
    pub metadata: SignalQualityMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_downweight_scales_with_coverage() {
        assert_eq!(SignalQualityMetadata::downweight_for_missing(4, 4), 1.0);
        assert_eq!(SignalQualityMetadata::downweight_for_missing(4, 2), 0.5);
        assert_eq!(SignalQualityMetadata::downweight_for_missing(0, 0), 1.0);
    }

    #[test]
    fn known_providers_are_provider_identifiers_not_tickers() {
        for provider in KNOWN_PROVIDERS {
            assert!(!provider.chars().any(|c| c.is_uppercase()), "{provider} looks like a ticker, not a provider id");
        }
    }
}
