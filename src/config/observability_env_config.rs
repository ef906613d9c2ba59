//! Observability configuration parsing from environment variables.
//!
//! This module handles loading the metrics/reporting configuration: a
//! push-based reporter on an interval rather than an HTTP scrape endpoint.

use std::env;

/// Observability environment configuration
#[derive(Debug, Clone)]
pub struct ObservabilityEnvConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub log_level: String,
}

impl Default for ObservabilityEnvConfig {
    fn default() -> Self {
        Self { enabled: true, interval_seconds: 60, log_level: "info".to_string() }
    }
}

impl ObservabilityEnvConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("OBSERVABILITY_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse::<bool>()
                .unwrap_or(true),
            interval_seconds: env::var("OBSERVABILITY_INTERVAL")
                .unwrap_or_else(|_| "60".to_string())
                .parse::<u64>()
                .unwrap_or(60),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}
