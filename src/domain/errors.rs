use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by the market registry before or during hydration.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("market registry used before hydrate() completed")]
    NotReady,

    #[error("unknown market for symbol: {symbol}")]
    UnknownMarket { symbol: String },

    #[error("registry hydration failed: {reason}")]
    HydrationFailed { reason: String },
}

/// Errors related to the strategy governor's plan lifecycle.
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("regime {regime} is in the proposed plan's avoid list")]
    RegimeExcluded { regime: String },

    #[error("net advantage {net_advantage_bps:.1}bps below minimum {minimum_bps:.1}bps")]
    InsufficientAdvantage {
        net_advantage_bps: f64,
        minimum_bps: f64,
    },

    #[error("plan review blocked: {reason}")]
    ReviewBlocked { reason: String },

    #[error("signal confidence {confidence:.2} below required 0.50")]
    LowConfidence { confidence: f64 },

    #[error("two active plans detected: {first} and {second}")]
    DuplicateActivePlan { first: String, second: String },
}

/// Errors related to market data and connectivity.
#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("connection lost: {reason}")]
    ConnectionLost { reason: String },

    #[error("invalid market data for {coin}: {reason}")]
    InvalidData { coin: String, reason: String },

    #[error("service timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("rate limit exceeded: retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },
}

/// Errors surfaced by tripwire-prescribed safety actions.
#[derive(Debug, Error)]
pub enum RiskViolation {
    #[error("margin ratio {current:.4} below minimum {min:.4}")]
    MarginRatioBreach { current: Decimal, min: Decimal },

    #[error("daily loss {loss_pct:.2}% exceeds limit {limit_pct:.2}%")]
    DailyLossLimit { loss_pct: f64, limit_pct: f64 },

    #[error("liquidation proximity {proximity_pct:.2}% below threshold {threshold_pct:.2}%")]
    LiquidationProximity {
        proximity_pct: f64,
        threshold_pct: f64,
    },
}

/// Errors related to order placement through the exchange collaborator.
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("insufficient funds: need ${need}, available ${available}")]
    InsufficientFunds { need: Decimal, available: Decimal },

    #[error("invalid order: {reason}")]
    InvalidOrder { reason: String },

    #[error("order execution failed: {reason}")]
    ExecutionFailed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_not_ready_message() {
        let err = RegistryError::NotReady;
        assert_eq!(err.to_string(), "market registry used before hydrate() completed");
    }

    #[test]
    fn test_governance_low_confidence_formatting() {
        let err = GovernanceError::LowConfidence { confidence: 0.32 };
        let msg = err.to_string();
        assert!(msg.contains("0.32"));
        assert!(msg.contains("0.50"));
    }

    #[test]
    fn test_risk_violation_formatting() {
        let violation = RiskViolation::DailyLossLimit { loss_pct: 6.25, limit_pct: 5.0 };
        let msg = violation.to_string();
        assert!(msg.contains("6.25%"));
        assert!(msg.contains("5.00%"));
    }
}
