//! Exchange collaborator configuration parsing from environment variables.
//!
//! This module handles loading the credentials and connection settings for the
//! venue the core trades against.

use std::env;

/// Exchange environment configuration
#[derive(Debug, Clone)]
pub struct ExchangeEnvConfig {
    pub account_address: String,
    pub secret_key: String,
    pub base_url: String,
    pub quote_asset: String,
}

impl Default for ExchangeEnvConfig {
    fn default() -> Self {
        Self {
            account_address: String::new(),
            secret_key: String::new(),
            base_url: "https://api.exchange.example".to_string(),
            quote_asset: "USDC".to_string(),
        }
    }
}

impl ExchangeEnvConfig {
    pub fn from_env() -> Self {
        Self {
            account_address: env::var("ACCOUNT_ADDRESS").unwrap_or_default(),
            secret_key: env::var("SECRET_KEY").unwrap_or_default(),
            base_url: env::var("BASE_URL").unwrap_or_else(|_| "https://api.exchange.example".to_string()),
            quote_asset: env::var("QUOTE_ASSET").unwrap_or_else(|_| "USDC".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_config_defaults() {
        let config = ExchangeEnvConfig::from_env();
        assert_eq!(config.quote_asset, "USDC");
    }
}
