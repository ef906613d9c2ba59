//! Risk and tripwire configuration parsing from environment variables.
//!
//! This module handles loading the thresholds the tripwire service and the
//! rebalancer enforce: margin, liquidation proximity, daily loss, staleness,
//! and trade-sizing constraints.

use anyhow::{Context, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::env;

/// Risk/tripwire environment configuration
#[derive(Debug, Clone)]
pub struct RiskEnvConfig {
    // Tripwire thresholds
    pub min_margin_ratio: f64,
    pub liquidation_proximity_threshold: f64,
    pub daily_loss_limit_pct: f64,
    pub max_data_staleness_seconds: f64,
    pub max_api_failure_count: u32,

    // Rebalancer constraints
    pub min_trade_value: Decimal,
    pub rebalance_threshold: f64,
    pub fee_bps: Decimal,
    pub default_slippage_bps: Decimal,
}

impl Default for RiskEnvConfig {
    fn default() -> Self {
        Self {
            min_margin_ratio: 0.15,
            liquidation_proximity_threshold: 0.25,
            daily_loss_limit_pct: 0.05,
            max_data_staleness_seconds: 300.0,
            max_api_failure_count: 3,
            min_trade_value: Decimal::from(10),
            rebalance_threshold: 0.02,
            fee_bps: Decimal::new(5, 1),
            default_slippage_bps: Decimal::from(5),
        }
    }
}

impl RiskEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            min_margin_ratio: Self::parse_f64("MIN_MARGIN_RATIO", defaults.min_margin_ratio)?,
            liquidation_proximity_threshold: Self::parse_f64(
                "LIQUIDATION_PROXIMITY_THRESHOLD",
                defaults.liquidation_proximity_threshold,
            )?,
            daily_loss_limit_pct: Self::parse_f64("DAILY_LOSS_LIMIT_PCT", defaults.daily_loss_limit_pct)?,
            max_data_staleness_seconds: Self::parse_f64(
                "MAX_DATA_STALENESS_SECONDS",
                defaults.max_data_staleness_seconds,
            )?,
            max_api_failure_count: Self::parse_u32("MAX_API_FAILURE_COUNT", defaults.max_api_failure_count)?,
            min_trade_value: Self::parse_decimal("MIN_TRADE_VALUE", defaults.min_trade_value)?,
            rebalance_threshold: Self::parse_f64("REBALANCE_THRESHOLD", defaults.rebalance_threshold)?,
            fee_bps: Self::parse_decimal("FEE_BPS", defaults.fee_bps)?,
            default_slippage_bps: Self::parse_decimal("DEFAULT_SLIPPAGE_BPS", defaults.default_slippage_bps)?,
        })
    }

    fn parse_f64(key: &str, default: f64) -> Result<f64> {
        env::var(key).unwrap_or_else(|_| default.to_string()).parse::<f64>().context(format!("Failed to parse {key}"))
    }

    fn parse_u32(key: &str, default: u32) -> Result<u32> {
        env::var(key).unwrap_or_else(|_| default.to_string()).parse::<u32>().context(format!("Failed to parse {key}"))
    }

    fn parse_decimal(key: &str, default: Decimal) -> Result<Decimal> {
        match env::var(key) {
            Ok(raw) => raw.parse::<f64>().ok().and_then(Decimal::from_f64).context(format!("Failed to parse {key}")),
            Err(_) => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_config_defaults() {
        let config = RiskEnvConfig::from_env().expect("should parse with defaults");
        assert_eq!(config.max_api_failure_count, 3);
        assert_eq!(config.min_margin_ratio, 0.15);
    }
}
