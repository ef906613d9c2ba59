//! Strategy governor configuration parsing from environment variables.
//!
//! This module handles loading the dwell/cooldown/hysteresis/rotation parameters
//! that govern how aggressively the core switches and rebalances plans.

use anyhow::{Context, Result};
use std::env;

/// Strategy governor environment configuration
#[derive(Debug, Clone)]
pub struct GovernorEnvConfig {
    // Loop cadences
    pub fast_loop_seconds: u64,
    pub medium_loop_seconds: u64,
    pub slow_loop_seconds: u64,
    pub fast_loop_timeout_seconds: u64,
    pub medium_loop_timeout_seconds: u64,
    pub slow_loop_timeout_seconds: u64,

    // Regime detector
    pub confirmation_cycles_required: usize,
    pub hysteresis_enter_threshold: f64,
    pub hysteresis_exit_threshold: f64,
    pub event_lock_before_hours: i64,
    pub event_lock_after_hours: i64,
    pub regime_history_capacity: usize,

    // Governor
    pub minimum_advantage_over_cost_bps: f64,
    pub cooldown_after_change_minutes: i64,
    pub partial_rotation_pct_per_cycle: f64,
    pub max_shadow_portfolios: usize,
    pub minimum_confidence_to_approve: f64,

    // Snapshot writer
    pub snapshot_retain_count: usize,
}

impl Default for GovernorEnvConfig {
    fn default() -> Self {
        Self {
            fast_loop_seconds: 10,
            medium_loop_seconds: 1_800,
            slow_loop_seconds: 86_400,
            fast_loop_timeout_seconds: 5,
            medium_loop_timeout_seconds: 15,
            slow_loop_timeout_seconds: 30,
            confirmation_cycles_required: 3,
            hysteresis_enter_threshold: 0.70,
            hysteresis_exit_threshold: 0.40,
            event_lock_before_hours: 2,
            event_lock_after_hours: 1,
            regime_history_capacity: 500,
            minimum_advantage_over_cost_bps: 50.0,
            cooldown_after_change_minutes: 60,
            partial_rotation_pct_per_cycle: 0.25,
            max_shadow_portfolios: 5,
            minimum_confidence_to_approve: 0.5,
            snapshot_retain_count: 20,
        }
    }
}

impl GovernorEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            fast_loop_seconds: Self::parse_u64("FAST_LOOP_SECONDS", defaults.fast_loop_seconds)?,
            medium_loop_seconds: Self::parse_u64("MEDIUM_LOOP_SECONDS", defaults.medium_loop_seconds)?,
            slow_loop_seconds: Self::parse_u64("SLOW_LOOP_SECONDS", defaults.slow_loop_seconds)?,
            fast_loop_timeout_seconds: Self::parse_u64("FAST_LOOP_TIMEOUT_SECONDS", defaults.fast_loop_timeout_seconds)?,
            medium_loop_timeout_seconds: Self::parse_u64("MEDIUM_LOOP_TIMEOUT_SECONDS", defaults.medium_loop_timeout_seconds)?,
            slow_loop_timeout_seconds: Self::parse_u64("SLOW_LOOP_TIMEOUT_SECONDS", defaults.slow_loop_timeout_seconds)?,
            confirmation_cycles_required: Self::parse_usize(
                "CONFIRMATION_CYCLES_REQUIRED",
                defaults.confirmation_cycles_required,
            )?,
            hysteresis_enter_threshold: Self::parse_f64("HYSTERESIS_ENTER_THRESHOLD", defaults.hysteresis_enter_threshold)?,
            hysteresis_exit_threshold: Self::parse_f64("HYSTERESIS_EXIT_THRESHOLD", defaults.hysteresis_exit_threshold)?,
            event_lock_before_hours: Self::parse_i64("EVENT_LOCK_BEFORE_HOURS", defaults.event_lock_before_hours)?,
            event_lock_after_hours: Self::parse_i64("EVENT_LOCK_AFTER_HOURS", defaults.event_lock_after_hours)?,
            regime_history_capacity: Self::parse_usize("REGIME_HISTORY_CAPACITY", defaults.regime_history_capacity)?,
            minimum_advantage_over_cost_bps: Self::parse_f64(
                "MINIMUM_ADVANTAGE_OVER_COST_BPS",
                defaults.minimum_advantage_over_cost_bps,
            )?,
            cooldown_after_change_minutes: Self::parse_i64(
                "COOLDOWN_AFTER_CHANGE_MINUTES",
                defaults.cooldown_after_change_minutes,
            )?,
            partial_rotation_pct_per_cycle: Self::parse_f64(
                "PARTIAL_ROTATION_PCT_PER_CYCLE",
                defaults.partial_rotation_pct_per_cycle,
            )?,
            max_shadow_portfolios: Self::parse_usize("MAX_SHADOW_PORTFOLIOS", defaults.max_shadow_portfolios)?,
            minimum_confidence_to_approve: Self::parse_f64(
                "MINIMUM_CONFIDENCE_TO_APPROVE",
                defaults.minimum_confidence_to_approve,
            )?,
            snapshot_retain_count: Self::parse_usize("SNAPSHOT_RETAIN_COUNT", defaults.snapshot_retain_count)?,
        })
    }

    fn parse_usize(key: &str, default: usize) -> Result<usize> {
        env::var(key).unwrap_or_else(|_| default.to_string()).parse::<usize>().context(format!("Failed to parse {key}"))
    }

    fn parse_u64(key: &str, default: u64) -> Result<u64> {
        env::var(key).unwrap_or_else(|_| default.to_string()).parse::<u64>().context(format!("Failed to parse {key}"))
    }

    fn parse_i64(key: &str, default: i64) -> Result<i64> {
        env::var(key).unwrap_or_else(|_| default.to_string()).parse::<i64>().context(format!("Failed to parse {key}"))
    }

    fn parse_f64(key: &str, default: f64) -> Result<f64> {
        env::var(key).unwrap_or_else(|_| default.to_string()).parse::<f64>().context(format!("Failed to parse {key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_governor_config_defaults() {
        let config = GovernorEnvConfig::from_env().expect("should parse with defaults");
        assert_eq!(config.confirmation_cycles_required, 3);
        assert!(config.hysteresis_enter_threshold > config.hysteresis_exit_threshold);
    }
}
