//! Deterministic in-memory `ExchangeClient`, used by tests, `backtest`, and
//! as the default venue when no live adapter is configured.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::ports::{
    Candle, ExchangeClient, FundingPoint, MarketMeta, OpenInterestPoint, OrderBook, OrderBookLevel,
    OrderRequest, OrderResult, SpotMarketMeta,
};
use crate::domain::types::AccountState;

pub struct MockExchangeClient {
    perp_meta: Vec<MarketMeta>,
    spot_meta: Vec<SpotMarketMeta>,
    mid_prices: RwLock<HashMap<String, Decimal>>,
    account: RwLock<AccountState>,
}

impl MockExchangeClient {
    pub fn with_default_markets() -> Self {
        let perp_meta = vec![
            MarketMeta { name: "BTC-PERP".to_string(), size_decimals: 5 },
            MarketMeta { name: "ETH-PERP".to_string(), size_decimals: 4 },
        ];
        let spot_meta = vec![
            SpotMarketMeta { name: "BTC/USDC".to_string(), base: "BTC".to_string(), quote: "USDC".to_string(), size_decimals: 5 },
            SpotMarketMeta { name: "ETH/USDC".to_string(), base: "ETH".to_string(), quote: "USDC".to_string(), size_decimals: 4 },
        ];
        let mut mid_prices = HashMap::new();
        mid_prices.insert("BTC".to_string(), dec!(60000));
        mid_prices.insert("ETH".to_string(), dec!(3000));

        Self {
            perp_meta,
            spot_meta,
            mid_prices: RwLock::new(mid_prices),
            account: RwLock::new(AccountState {
                portfolio_value: dec!(100000),
                available_balance: dec!(100000),
                positions: Vec::new(),
                spot_balances: HashMap::from([("USDC".to_string(), dec!(100000))]),
                timestamp: Utc::now(),
                is_stale: false,
            }),
        }
    }

    pub fn set_mid_price(&self, coin: &str, price: Decimal) {
        self.mid_prices.write().unwrap().insert(coin.to_string(), price);
    }

    fn mid(&self, coin: &str) -> Decimal {
        self.mid_prices.read().unwrap().get(coin).copied().unwrap_or(dec!(100))
    }
}

impl Default for MockExchangeClient {
    fn default() -> Self {
        Self::with_default_markets()
    }
}

#[async_trait]
impl ExchangeClient for MockExchangeClient {
    async fn meta(&self) -> Result<Vec<MarketMeta>> {
        Ok(self.perp_meta.clone())
    }

    async fn spot_meta(&self) -> Result<Vec<SpotMarketMeta>> {
        Ok(self.spot_meta.clone())
    }

    async fn fetch_order_book(&self, coin: &str) -> Result<OrderBook> {
        let mid = self.mid(coin);
        let spread = mid * dec!(0.0005);
        Ok(OrderBook {
            bids: vec![
                OrderBookLevel { price: mid - spread, size: dec!(10) },
                OrderBookLevel { price: mid - spread * Decimal::TWO, size: dec!(20) },
            ],
            asks: vec![
                OrderBookLevel { price: mid + spread, size: dec!(10) },
                OrderBookLevel { price: mid + spread * Decimal::TWO, size: dec!(20) },
            ],
            timestamp: Utc::now(),
        })
    }

    async fn fetch_candles(&self, coin: &str, _interval: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Candle>> {
        let mid = self.mid(coin);
        let mut candles = Vec::new();
        let mut t = start;
        while t < end {
            candles.push(Candle { open: mid, high: mid * dec!(1.002), low: mid * dec!(0.998), close: mid, volume: dec!(1000), timestamp: t });
            t += Duration::hours(1);
        }
        Ok(candles)
    }

    async fn fetch_funding_history(&self, _coin: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<FundingPoint>> {
        let mut points = Vec::new();
        let mut t = start;
        while t < end {
            points.push(FundingPoint { rate: 0.0001, premium: 0.00005, timestamp: t });
            t += Duration::hours(8);
        }
        Ok(points)
    }

    async fn fetch_open_interest(&self, _coin: &str) -> Result<OpenInterestPoint> {
        Ok(OpenInterestPoint { open_interest: dec!(1000000), timestamp: Utc::now() })
    }

    async fn place_order(&self, request: OrderRequest) -> Result<OrderResult> {
        Ok(OrderResult {
            order_id: uuid::Uuid::new_v4().to_string(),
            filled: Some(request.size),
            success: true,
            error: None,
        })
    }

    async fn cancel_all_orders(&self) -> Result<()> {
        Ok(())
    }

    async fn account_state(&self) -> Result<AccountState> {
        Ok(self.account.read().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn order_book_mid_matches_configured_price() {
        let exchange = MockExchangeClient::with_default_markets();
        let book = exchange.fetch_order_book("BTC").await.unwrap();
        assert_eq!(book.mid(), Some(dec!(60000)));
    }

    #[tokio::test]
    async fn candles_span_the_requested_window_hourly() {
        let exchange = MockExchangeClient::with_default_markets();
        let start = Utc::now();
        let end = start + Duration::hours(5);
        let candles = exchange.fetch_candles("BTC", "1h", start, end).await.unwrap();
        assert_eq!(candles.len(), 5);
    }
}
