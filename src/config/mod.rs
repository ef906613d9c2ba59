//! Configuration module for the governor core.
//!
//! Provides structured configuration loading from environment variables,
//! organized by domain: Exchange, Governor, Risk, and Observability.

mod exchange_env_config;
mod governor_env_config;
mod observability_env_config;
mod risk_env_config;

pub use exchange_env_config::ExchangeEnvConfig;
pub use governor_env_config::GovernorEnvConfig;
pub use observability_env_config::ObservabilityEnvConfig;
pub use risk_env_config::RiskEnvConfig;

use anyhow::{Context, Result};
use std::env;

/// Aggregate configuration built from the domain-split sub-configs above.
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    pub exchange: ExchangeEnvConfig,
    pub governor: GovernorEnvConfig,
    pub risk: RiskEnvConfig,
    pub observability: ObservabilityEnvConfig,

    pub llm_provider: Option<String>,
    pub llm_api_key: Option<String>,
    pub database_url: String,
}

impl GovernorConfig {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let exchange = ExchangeEnvConfig::from_env();
        let governor = GovernorEnvConfig::from_env().context("Failed to load governor config")?;
        let risk = RiskEnvConfig::from_env().context("Failed to load risk config")?;
        let observability = ObservabilityEnvConfig::from_env();

        Ok(Self {
            exchange,
            governor,
            risk,
            observability,
            llm_provider: env::var("LLM_PROVIDER").ok(),
            llm_api_key: env::var("LLM_API_KEY").ok(),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://governor.db".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_governor_config_from_env_defaults() {
        let config = GovernorConfig::from_env().expect("should parse with defaults");
        assert_eq!(config.exchange.quote_asset, "USDC");
        assert_eq!(config.governor.confirmation_cycles_required, 3);
        assert_eq!(config.risk.max_api_failure_count, 3);
    }
}
