//! Collaborator boundaries the core consumes: the exchange (order book,
//! candles, funding, order placement, account state) and the strategy
//! advisor (plan proposal, regime classification). Both are external to this
//! crate's scope — only the trait and a deterministic mock are shipped here.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::plan_card::PlanCard;
use crate::domain::regime::{Regime, RegimeSignals};
use crate::domain::types::AccountState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMeta {
    pub name: String,
    pub size_decimals: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotMarketMeta {
    pub name: String,
    pub base: String,
    pub quote: String,
    pub size_decimals: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    pub fn mid(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some((b + a) / Decimal::TWO),
            _ => None,
        }
    }

    /// Sum of order size within `pct` of mid, both sides combined.
    pub fn depth_within_pct(&self, pct: Decimal) -> Decimal {
        let Some(mid) = self.mid() else { return Decimal::ZERO };
        let band = mid * pct;
        let bid_depth: Decimal = self
            .bids
            .iter()
            .filter(|l| mid - l.price <= band)
            .map(|l| l.size)
            .sum();
        let ask_depth: Decimal = self
            .asks
            .iter()
            .filter(|l| l.price - mid <= band)
            .map(|l| l.size)
            .sum();
        bid_depth + ask_depth
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundingPoint {
    pub rate: f64,
    pub premium: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpenInterestPoint {
    pub open_interest: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub coin: String,
    pub side: OrderSide,
    pub size: Decimal,
    pub limit_price: Option<Decimal>,
    pub reduce_only: bool,
    pub post_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub filled: Option<Decimal>,
    pub success: bool,
    pub error: Option<String>,
}

/// The exchange collaborator: market metadata hydration, market data fetch,
/// order placement, and account state. A real venue adapter is out of scope
/// here — only the trait boundary and `MockExchangeClient` are implemented.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn meta(&self) -> Result<Vec<MarketMeta>>;
    async fn spot_meta(&self) -> Result<Vec<SpotMarketMeta>>;
    async fn fetch_order_book(&self, coin: &str) -> Result<OrderBook>;
    async fn fetch_candles(
        &self,
        coin: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;
    async fn fetch_funding_history(
        &self,
        coin: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FundingPoint>>;
    async fn fetch_open_interest(&self, coin: &str) -> Result<OpenInterestPoint>;
    async fn place_order(&self, request: OrderRequest) -> Result<OrderResult>;
    async fn cancel_all_orders(&self) -> Result<()>;
    async fn account_state(&self) -> Result<AccountState>;
}

/// The advisor's verdict on a proposed plan card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdvisorResponse {
    Propose(Box<PlanCard>),
    Maintain,
}

/// The LLM advisor collaborator (or a rule-based substitute satisfying the
/// same interface): proposes plan cards and classifies the current regime.
/// Both calls are cost-tracked but only invoked from medium/slow loops.
#[async_trait]
pub trait StrategyAdvisor: Send + Sync {
    async fn propose_plan(
        &self,
        account: &AccountState,
        current_regime: Regime,
        active_plan: Option<&PlanCard>,
    ) -> Result<AdvisorResponse>;

    async fn classify_regime(&self, signals: &RegimeSignals) -> Result<Regime>;

    /// Token/request cost of the last call; `0` for non-LLM implementations.
    fn last_call_cost(&self) -> u64 {
        0
    }
}

/// On-chain data: token unlocks and whale net-flow.
#[async_trait]
pub trait OnChainProvider: Send + Sync {
    async fn token_unlocks_7d(&self, coin: &str) -> Result<f64>;
    async fn whale_net_flow_24h(&self, coin: &str) -> Result<(f64, f64, u64)>;
}

/// Cross-asset/macro context: correlations and the macro-event calendar.
#[async_trait]
pub trait ExternalMarketProvider: Send + Sync {
    async fn btc_eth_correlation(&self) -> Result<f64>;
    async fn btc_spx_correlation(&self) -> Result<Option<f64>>;
    async fn macro_events_upcoming(&self, within_days: i64) -> Result<Vec<crate::domain::signals::MacroEvent>>;
}

/// Sentiment: fear/greed index normalized to `[-1, +1]`.
#[async_trait]
pub trait SentimentProvider: Send + Sync {
    async fn fear_greed_index(&self) -> Result<f64>;
}

/// Narrow seam the tripwire service uses to force a plan change without
/// holding a concrete reference to the governor.
#[async_trait]
pub trait PlanInvalidator: Send + Sync {
    async fn invalidate_plan(&self, reason: String, now: DateTime<Utc>);
}

/// Narrow seam for readers that need the current regime and event-lock
/// state without holding a concrete reference to the regime detector.
#[async_trait]
pub trait RegimeHistoryReader: Send + Sync {
    async fn current_regime(&self) -> Regime;
    async fn is_event_locked(&self) -> bool;
}
