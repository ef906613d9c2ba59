//! Core value types shared across the governance engine: account/portfolio
//! snapshots, target allocations, and the trades the rebalancer emits.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Spot vs. perpetual-futures market for a given coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    Spot,
    Perp,
}

impl std::fmt::Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketType::Spot => write!(f, "spot"),
            MarketType::Perp => write!(f, "perp"),
        }
    }
}

/// A single open position, spot or perp. `size` is signed: negative is short
/// (perp only — spot balances are never negative).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub coin: String,
    pub market_type: MarketType,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub leverage: Option<Decimal>,
}

impl Position {
    pub fn notional(&self) -> Decimal {
        self.size.abs() * self.current_price
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        (self.current_price - self.entry_price) * self.size
    }
}

/// Account state as reported by the exchange, refreshed every tick and never
/// mutated after publication — callers hold an `Arc<AccountState>` snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub portfolio_value: Decimal,
    pub available_balance: Decimal,
    pub positions: Vec<Position>,
    pub spot_balances: HashMap<String, Decimal>,
    pub timestamp: DateTime<Utc>,
    pub is_stale: bool,
}

impl AccountState {
    pub fn position(&self, coin: &str, market_type: MarketType) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| p.coin == coin && p.market_type == market_type)
    }

    /// Ratio of positions whose unrealized loss exceeds their maintenance
    /// margin allowance is left to the exchange; here we expose the simple
    /// equity-based ratio tripwires key off.
    pub fn margin_ratio(&self) -> Decimal {
        if self.portfolio_value.is_zero() {
            return Decimal::ZERO;
        }
        self.available_balance / self.portfolio_value
    }
}

/// Portfolio state derived from `AccountState`: allocations as fractions of
/// total value, keyed by coin symbol (cash/margin aggregates under `USDC`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub total_value: Decimal,
    pub available_balance: Decimal,
    pub allocations: HashMap<String, Decimal>,
    pub positions: HashMap<String, Position>,
    pub timestamp: DateTime<Utc>,
}

pub const CASH_COIN: &str = "USDC";

impl PortfolioState {
    /// Build a `PortfolioState` from an `AccountState` snapshot. Perp
    /// positions contribute their absolute notional; spot balances are
    /// valued at `current_price` from `prices` when available.
    pub fn from_account(account: &AccountState, prices: &HashMap<String, Decimal>) -> Self {
        let mut allocations = HashMap::new();
        let mut positions = HashMap::new();
        let total = account.portfolio_value;

        for position in &account.positions {
            let pct = if total.is_zero() {
                Decimal::ZERO
            } else {
                position.notional() / total
            };
            *allocations.entry(position.coin.clone()).or_insert(Decimal::ZERO) += pct;
            positions.insert(position.coin.clone(), position.clone());
        }

        for (coin, balance) in &account.spot_balances {
            if coin == CASH_COIN {
                continue;
            }
            let price = prices.get(coin).copied().unwrap_or(Decimal::ZERO);
            let value = balance * price;
            let pct = if total.is_zero() { Decimal::ZERO } else { value / total };
            *allocations.entry(coin.clone()).or_insert(Decimal::ZERO) += pct;
        }

        let allocated: Decimal = allocations.values().copied().sum();
        let cash_pct = (Decimal::ONE - allocated).max(Decimal::ZERO);
        allocations.insert(CASH_COIN.to_string(), cash_pct);

        Self {
            total_value: total,
            available_balance: account.available_balance,
            allocations,
            positions,
            timestamp: account.timestamp,
        }
    }

    pub fn allocation_sum(&self) -> Decimal {
        self.allocations.values().copied().sum()
    }
}

/// A proposed set of target allocations, normally produced by the strategy
/// advisor. Sum of `allocations` must lie within `[0.99, 1.01]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAllocation {
    pub allocations: HashMap<String, Decimal>,
    pub strategy_id: Option<String>,
    pub reasoning: String,
}

impl TargetAllocation {
    pub fn is_valid(&self) -> bool {
        let sum: Decimal = self.allocations.values().copied().sum();
        sum >= Decimal::new(99, 2) && sum <= Decimal::new(101, 2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Buy,
    Sell,
    Hold,
    Close,
}

/// A single trade the rebalancer wants executed. `size` is always positive;
/// direction is carried by `action_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeAction {
    pub action_type: ActionType,
    pub coin: String,
    pub market_type: MarketType,
    pub size: Option<Decimal>,
    pub limit_price: Option<Decimal>,
    pub reasoning: String,
}

impl TradeAction {
    pub fn notional(&self, price: Decimal) -> Decimal {
        self.size.unwrap_or(Decimal::ZERO) * price
    }
}

/// The ordered trade sequence produced by the rebalancer for one cycle.
/// Sells always precede buys; no prefix of `actions` may drive available
/// capital negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalancingPlan {
    pub actions: Vec<TradeAction>,
    pub estimated_cost_bps: Decimal,
    pub reasoning: String,
}

impl RebalancingPlan {
    pub fn empty(reasoning: impl Into<String>) -> Self {
        Self {
            actions: Vec::new(),
            estimated_cost_bps: Decimal::ZERO,
            reasoning: reasoning.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_account() -> AccountState {
        AccountState {
            portfolio_value: dec!(10000),
            available_balance: dec!(4000),
            positions: vec![Position {
                coin: "BTC".into(),
                market_type: MarketType::Perp,
                size: dec!(0.1),
                entry_price: dec!(60000),
                current_price: dec!(60000),
                leverage: Some(dec!(2)),
            }],
            spot_balances: HashMap::new(),
            timestamp: Utc::now(),
            is_stale: false,
        }
    }

    #[test]
    fn portfolio_from_account_allocates_cash_remainder() {
        let account = sample_account();
        let portfolio = PortfolioState::from_account(&account, &HashMap::new());
        assert_eq!(portfolio.allocations["BTC"], dec!(0.6));
        assert_eq!(portfolio.allocations[CASH_COIN], dec!(0.4));
        assert_eq!(portfolio.allocation_sum(), Decimal::ONE);
    }

    #[test]
    fn target_allocation_validity_window() {
        let mut allocations = HashMap::new();
        allocations.insert("BTC".to_string(), dec!(0.995));
        allocations.insert(CASH_COIN.to_string(), dec!(0.0));
        let target = TargetAllocation { allocations, strategy_id: None, reasoning: String::new() };
        assert!(target.is_valid());

        let mut bad = HashMap::new();
        bad.insert("BTC".to_string(), dec!(1.02));
        let target = TargetAllocation { allocations: bad, strategy_id: None, reasoning: String::new() };
        assert!(!target.is_valid());
    }

    #[test]
    fn position_notional_and_pnl() {
        let position = Position {
            coin: "ETH".into(),
            market_type: MarketType::Perp,
            size: dec!(-2),
            entry_price: dec!(3000),
            current_price: dec!(2900),
            leverage: None,
        };
        assert_eq!(position.notional(), dec!(5800));
        assert_eq!(position.unrealized_pnl(), dec!(200));
    }
}
