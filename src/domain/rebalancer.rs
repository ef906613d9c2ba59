//! The portfolio rebalancer: a pure function from (current state, target
//! allocation, constraints) to an ordered, capital-respecting trade plan.
//!
//! Purity is structural: no clock reads, no cache lookups, no logging inside
//! the algorithm. The call site (the governor) is responsible for logging
//! the resulting plan.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;

use crate::domain::types::{ActionType, MarketType, PortfolioState, RebalancingPlan, TargetAllocation, TradeAction, CASH_COIN};

#[derive(Debug, Clone, Copy)]
pub struct RebalanceConstraints {
    pub min_trade_value: Decimal,
    pub rebalance_threshold: Decimal,
    pub fee_bps: Decimal,
}

impl Default for RebalanceConstraints {
    fn default() -> Self {
        Self {
            min_trade_value: Decimal::new(10, 0),
            rebalance_threshold: Decimal::new(2, 2),
            fee_bps: Decimal::new(5, 1),
        }
    }
}

struct Delta {
    coin: String,
    current_pct: Decimal,
    target_pct: Decimal,
    delta: Decimal,
}

/// Compute the ordered trade plan. `prices` must contain an entry for every
/// coin that needs a buy; a coin with a `delta > 0` but no price is skipped
/// (logged in `reasoning`, not treated as a failure). `size_decimals`
/// defaults to 4 for unknown coins. `slippage_bps` is an optional per-coin
/// override for the cost estimate; absent entries use a flat default of 5bps.
pub fn rebalance(
    current: &PortfolioState,
    target: &TargetAllocation,
    prices: &HashMap<String, Decimal>,
    size_decimals: &HashMap<String, u32>,
    slippage_bps: &HashMap<String, Decimal>,
    constraints: &RebalanceConstraints,
) -> RebalancingPlan {
    if !target.is_valid() {
        return RebalancingPlan::empty("invalid target: allocations do not sum to ~1.0");
    }

    let mut coins: HashSet<String> = current.allocations.keys().cloned().collect();
    coins.extend(target.allocations.keys().cloned());
    coins.remove(CASH_COIN);

    let mut deltas: Vec<Delta> = coins
        .into_iter()
        .map(|coin| {
            let current_pct = current.allocations.get(&coin).copied().unwrap_or(Decimal::ZERO);
            let target_pct = target.allocations.get(&coin).copied().unwrap_or(Decimal::ZERO);
            Delta { coin, current_pct, target_pct, delta: target_pct - current_pct }
        })
        .filter(|d| d.delta.abs() >= constraints.rebalance_threshold)
        .collect();

    if deltas.is_empty() {
        return RebalancingPlan::empty("no significant deviations");
    }

    let total_value = current.total_value;
    let mut available_capital = Decimal::ZERO;
    let mut actions = Vec::new();
    let mut notes = Vec::new();

    deltas.sort_by(|a, b| a.delta.cmp(&b.delta));
    for d in deltas.iter().filter(|d| d.delta < Decimal::ZERO) {
        let reduce_value = (d.current_pct - d.target_pct) * total_value;
        if reduce_value < constraints.min_trade_value {
            notes.push(format!("{}: reduce value below min_trade_value, skipped", d.coin));
            continue;
        }
        let price = prices.get(&d.coin).copied().unwrap_or(Decimal::ZERO);
        if d.target_pct.is_zero() {
            actions.push(TradeAction {
                action_type: ActionType::Close,
                coin: d.coin.clone(),
                market_type: MarketType::Perp,
                size: None,
                limit_price: None,
                reasoning: "target allocation is zero".to_string(),
            });
        } else if price > Decimal::ZERO {
            let decimals = size_decimals.get(&d.coin).copied().unwrap_or(4);
            let size = round_down(reduce_value / price, decimals);
            if size > Decimal::ZERO {
                actions.push(TradeAction {
                    action_type: ActionType::Sell,
                    coin: d.coin.clone(),
                    market_type: MarketType::Perp,
                    size: Some(size),
                    limit_price: None,
                    reasoning: format!("reduce allocation from {} to {}", d.current_pct, d.target_pct),
                });
            }
        } else {
            notes.push(format!("{}: no price available, skipped reduce", d.coin));
            continue;
        }
        available_capital += reduce_value;
    }

    deltas.sort_by(|a, b| b.delta.cmp(&a.delta));
    for d in deltas.iter().filter(|d| d.delta > Decimal::ZERO) {
        let desired = (d.target_pct - d.current_pct) * total_value;
        let increase_value = desired.min(available_capital);
        if increase_value < constraints.min_trade_value {
            notes.push(format!("{}: increase value below min_trade_value or no capital left, skipped", d.coin));
            continue;
        }
        let Some(price) = prices.get(&d.coin).copied().filter(|p| *p > Decimal::ZERO) else {
            notes.push(format!("{}: no price available, skipped buy", d.coin));
            continue;
        };
        let decimals = size_decimals.get(&d.coin).copied().unwrap_or(4);
        let size = round_down(increase_value / price, decimals);
        if size.is_zero() {
            notes.push(format!("{}: size rounds to zero, skipped", d.coin));
            continue;
        }
        actions.push(TradeAction {
            action_type: ActionType::Buy,
            coin: d.coin.clone(),
            market_type: MarketType::Perp,
            size: Some(size),
            limit_price: None,
            reasoning: format!("increase allocation from {} to {}", d.current_pct, d.target_pct),
        });
        available_capital -= increase_value;
    }

    if actions.is_empty() {
        return RebalancingPlan::empty(if notes.is_empty() {
            "no trades produced".to_string()
        } else {
            notes.join("; ")
        });
    }

    let default_slippage = Decimal::new(5, 0);
    let estimated_cost_bps: Decimal = actions
        .iter()
        .map(|a| constraints.fee_bps + slippage_bps.get(&a.coin).copied().unwrap_or(default_slippage))
        .sum();

    RebalancingPlan {
        actions,
        estimated_cost_bps,
        reasoning: if notes.is_empty() {
            "rebalanced toward target allocation".to_string()
        } else {
            notes.join("; ")
        },
    }
}

fn round_down(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, rust_decimal::RoundingStrategy::ToZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn portfolio(allocations: &[(&str, Decimal)], total_value: Decimal) -> PortfolioState {
        PortfolioState {
            total_value,
            available_balance: total_value,
            allocations: allocations.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            positions: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    fn target(allocations: &[(&str, Decimal)]) -> TargetAllocation {
        TargetAllocation {
            allocations: allocations.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            strategy_id: None,
            reasoning: String::new(),
        }
    }

    // S1: pure rebalance arithmetic — 100% cash to 60/40 BTC/ETH.
    #[test]
    fn s1_deploys_all_capital_sells_before_buys_ordering_respected() {
        let current = portfolio(&[(CASH_COIN, Decimal::ONE)], dec!(10000));
        let target = target(&[("BTC", dec!(0.6)), ("ETH", dec!(0.4))]);
        let prices = HashMap::from([("BTC".to_string(), dec!(60000)), ("ETH".to_string(), dec!(3000))]);
        let plan = rebalance(&current, &target, &prices, &HashMap::new(), &HashMap::new(), &RebalanceConstraints::default());
        assert_eq!(plan.actions.len(), 2);
        assert!(plan.actions.iter().all(|a| a.action_type == ActionType::Buy));
        let btc = plan.actions.iter().find(|a| a.coin == "BTC").unwrap();
        assert_eq!(btc.size, Some(dec!(0.1)));
    }

    // S2: threshold filtering — tiny deviations under rebalance_threshold are dropped.
    #[test]
    fn s2_small_deviation_below_threshold_produces_no_trade() {
        let current = portfolio(&[("BTC", dec!(0.5)), (CASH_COIN, dec!(0.5))], dec!(10000));
        let target = target(&[("BTC", dec!(0.505)), (CASH_COIN, dec!(0.495))]);
        let prices = HashMap::from([("BTC".to_string(), dec!(60000))]);
        let plan = rebalance(&current, &target, &prices, &HashMap::new(), &HashMap::new(), &RebalanceConstraints::default());
        assert!(plan.is_empty());
    }

    // S3: insufficient-capital clipping — buy demand exceeds capital freed by sells.
    #[test]
    fn s3_buy_demand_clipped_to_available_capital_from_sells() {
        let current = portfolio(&[("BTC", dec!(0.9)), (CASH_COIN, dec!(0.1))], dec!(10000));
        let target = target(&[("BTC", dec!(0.1)), ("ETH", dec!(0.9))]);
        let prices = HashMap::from([("BTC".to_string(), dec!(60000)), ("ETH".to_string(), dec!(3000))]);
        let plan = rebalance(&current, &target, &prices, &HashMap::new(), &HashMap::new(), &RebalanceConstraints::default());
        let sell = plan.actions.iter().find(|a| a.coin == "BTC").unwrap();
        assert_eq!(sell.action_type, ActionType::Sell);
        let buy = plan.actions.iter().find(|a| a.coin == "ETH").unwrap();
        // freed capital from the BTC sell = 0.8*10000 = 8000; desired buy = 0.9*10000 = 9000,
        // so the buy is clipped down to the capital actually freed.
        assert_eq!(buy.size.unwrap() * dec!(3000), dec!(8000));
    }

    #[test]
    fn sell_ordered_before_buy_in_actions_list() {
        let current = portfolio(&[("BTC", dec!(0.8)), (CASH_COIN, dec!(0.2))], dec!(10000));
        let target = target(&[("BTC", dec!(0.2)), ("ETH", dec!(0.8))]);
        let prices = HashMap::from([("BTC".to_string(), dec!(60000)), ("ETH".to_string(), dec!(3000))]);
        let plan = rebalance(&current, &target, &prices, &HashMap::new(), &HashMap::new(), &RebalanceConstraints::default());
        let sell_idx = plan.actions.iter().position(|a| a.action_type == ActionType::Sell).unwrap();
        let buy_idx = plan.actions.iter().position(|a| a.action_type == ActionType::Buy).unwrap();
        assert!(sell_idx < buy_idx);
    }

    #[test]
    fn invalid_target_allocation_yields_empty_plan() {
        let current = portfolio(&[(CASH_COIN, Decimal::ONE)], dec!(10000));
        let target = target(&[("BTC", dec!(1.5))]);
        let plan = rebalance(&current, &target, &HashMap::new(), &HashMap::new(), &HashMap::new(), &RebalanceConstraints::default());
        assert!(plan.is_empty());
        assert!(plan.reasoning.contains("invalid target"));
    }

    #[test]
    fn missing_price_for_new_coin_skips_without_failing() {
        let current = portfolio(&[(CASH_COIN, Decimal::ONE)], dec!(10000));
        let target = target(&[("DOGE", dec!(1.0))]);
        let plan = rebalance(&current, &target, &HashMap::new(), &HashMap::new(), &HashMap::new(), &RebalanceConstraints::default());
        assert!(plan.is_empty());
        assert!(plan.reasoning.contains("no price available"));
    }

    #[test]
    fn rebalance_is_pure_same_inputs_same_output() {
        let current = portfolio(&[(CASH_COIN, Decimal::ONE)], dec!(10000));
        let target = target(&[("BTC", dec!(0.6)), ("ETH", dec!(0.4))]);
        let prices = HashMap::from([("BTC".to_string(), dec!(60000)), ("ETH".to_string(), dec!(3000))]);
        let constraints = RebalanceConstraints::default();
        let plan_a = rebalance(&current, &target, &prices, &HashMap::new(), &HashMap::new(), &constraints);
        let plan_b = rebalance(&current, &target, &prices, &HashMap::new(), &HashMap::new(), &constraints);
        assert_eq!(plan_a, plan_b);
    }
}
