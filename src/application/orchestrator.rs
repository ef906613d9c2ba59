//! The signal orchestrator: owns the rolling price/open-interest buffers,
//! builds each cycle's watchlist, and assembles the fast/medium/slow signal
//! bundles by fanning concurrent provider calls out and joining with a
//! per-bundle timeout. Bundle assembly never returns an error — a provider
//! that fails or times out is simply omitted and the bundle's confidence is
//! downweighted by the missing/expected ratio, per the providers' own
//! fallback contract.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::application::indicators;
use crate::application::providers::exchange_provider::ExchangeProvider;
use crate::application::providers::onchain_provider::OnChainDataProvider;
use crate::application::providers::external_market_provider::MarketContextProvider;
use crate::application::providers::sentiment_provider::FearGreedProvider;
use crate::domain::plan_card::PlanCard;
use crate::domain::ports::Candle;
use crate::domain::signals::{
    FastBundle, LiquidityRegime, MacroEvent, MediumBundle, SignalQualityMetadata, SlowBundle, Trend, WhaleFlow,
    PROVIDER_EXCHANGE, PROVIDER_EXTERNAL_MARKET, PROVIDER_ONCHAIN, PROVIDER_SENTIMENT,
};
use crate::domain::types::{AccountState, MarketType};

const PRICE_HISTORY_CAPACITY: usize = 540;
const LOOKBACK_1D: usize = 6;
const LOOKBACK_7D: usize = 42;
const LOOKBACK_30D: usize = 180;
const LOOKBACK_90D: usize = 540;

/// Per-coin ring buffer of closed 4h candles, ~90 days deep. Single-writer
/// (the medium loop); readers take a cloned snapshot of the contents.
#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
    entries: VecDeque<(Decimal, Decimal, Decimal, DateTime<Utc>)>,
}

impl PriceHistory {
    pub fn push(&mut self, close: Decimal, high: Decimal, low: Decimal, timestamp: DateTime<Utc>) {
        self.entries.push_back((close, high, low, timestamp));
        while self.entries.len() > PRICE_HISTORY_CAPACITY {
            self.entries.pop_front();
        }
    }

    fn return_over(&self, lookback: usize) -> Option<f64> {
        if self.entries.len() <= lookback {
            return None;
        }
        let latest = self.entries.back()?.0;
        let past = self.entries[self.entries.len() - 1 - lookback].0;
        if past.is_zero() {
            return None;
        }
        ((latest - past) / past).to_f64()
    }

    pub fn returns_1d(&self) -> Option<f64> {
        self.return_over(LOOKBACK_1D)
    }

    pub fn returns_7d(&self) -> Option<f64> {
        self.return_over(LOOKBACK_7D)
    }

    pub fn returns_30d(&self) -> Option<f64> {
        self.return_over(LOOKBACK_30D)
    }

    pub fn returns_90d(&self) -> Option<f64> {
        self.return_over(LOOKBACK_90D.min(self.entries.len().saturating_sub(1).max(1)))
    }

    /// `true` when the last few local extrema show both higher highs and
    /// higher lows — a coarse uptrend-structure predicate, computed by
    /// comparing successive peak/trough pairs over the tail of the buffer.
    pub fn market_structure_higher_highs_and_lows(&self) -> bool {
        if self.entries.len() < 6 {
            return false;
        }
        let tail: Vec<_> = self.entries.iter().rev().take(6).collect();
        let highs_rising = tail.windows(2).all(|w| w[0].1 >= w[1].1);
        let lows_rising = tail.windows(2).all(|w| w[0].2 >= w[1].2);
        highs_rising && lows_rising
    }
}

/// Per-coin open-interest buffer covering the trailing 24h at whatever
/// cadence the medium loop runs at.
#[derive(Debug, Clone, Default)]
pub struct OpenInterestHistory {
    entries: VecDeque<(Decimal, DateTime<Utc>)>,
}

impl OpenInterestHistory {
    pub fn push(&mut self, value: Decimal, timestamp: DateTime<Utc>) {
        self.entries.push_back((value, timestamp));
        let cutoff = timestamp - chrono::Duration::hours(48);
        while self.entries.front().map(|(_, t)| *t < cutoff).unwrap_or(false) {
            self.entries.pop_front();
        }
    }

    pub fn change_24h_pct(&self, now: DateTime<Utc>) -> Option<f64> {
        let cutoff = now - chrono::Duration::hours(24);
        let baseline = self.entries.iter().find(|(_, t)| *t >= cutoff)?.0;
        let latest = self.entries.back()?.0;
        if baseline.is_zero() {
            return None;
        }
        ((latest - baseline) / baseline).to_f64()
    }
}

/// `build_watchlist`: every perp position's coin, every perp-market coin on
/// the active plan's target allocation, plus BTC/ETH unconditionally for
/// regime inputs. Spot balances are excluded — they are settlement capital.
pub fn build_watchlist(account: &AccountState, active_plan: Option<&PlanCard>) -> HashSet<String> {
    let mut watchlist = HashSet::new();
    for position in &account.positions {
        if position.market_type == MarketType::Perp {
            watchlist.insert(position.coin.clone());
        }
    }
    if let Some(plan) = active_plan {
        for coin in plan.target_allocations.allocations.keys() {
            if coin != crate::domain::types::CASH_COIN {
                watchlist.insert(coin.clone());
            }
        }
    }
    watchlist.insert("BTC".to_string());
    watchlist.insert("ETH".to_string());
    watchlist
}

pub struct SignalOrchestrator {
    exchange: Arc<ExchangeProvider>,
    onchain: Arc<OnChainDataProvider>,
    market_context: Arc<MarketContextProvider>,
    sentiment: Arc<FearGreedProvider>,
    price_histories: RwLock<HashMap<String, PriceHistory>>,
    oi_histories: RwLock<HashMap<String, OpenInterestHistory>>,
}

impl SignalOrchestrator {
    pub fn new(
        exchange: Arc<ExchangeProvider>,
        onchain: Arc<OnChainDataProvider>,
        market_context: Arc<MarketContextProvider>,
        sentiment: Arc<FearGreedProvider>,
    ) -> Self {
        Self {
            exchange,
            onchain,
            market_context,
            sentiment,
            price_histories: RwLock::new(HashMap::new()),
            oi_histories: RwLock::new(HashMap::new()),
        }
    }

    pub async fn price_history_snapshot(&self, coin: &str) -> Option<PriceHistory> {
        self.price_histories.read().await.get(coin).cloned()
    }

    /// Collects the fast bundle: per-coin spread/depth/slippage derived from
    /// a concurrently fetched order book, capped at `timeout`.
    pub async fn collect_fast(&self, watchlist: &HashSet<String>, timeout: Duration) -> FastBundle {
        let started = std::time::Instant::now();
        let coins: Vec<String> = watchlist.iter().cloned().collect();
        let fetch_all = join_all(coins.iter().map(|coin| {
            let exchange = self.exchange.clone();
            let coin = coin.clone();
            async move { (coin.clone(), exchange.order_book(&coin).await) }
        }));

        let results = match tokio::time::timeout(timeout, fetch_all).await {
            Ok(results) => results,
            Err(_) => Vec::new(),
        };

        let mut spreads_bps = HashMap::new();
        let mut depth = HashMap::new();
        let mut slippage = HashMap::new();
        let mut succeeded = 0usize;

        for (coin, result) in &results {
            if result.confidence <= 0.0 {
                continue;
            }
            let Some(mid) = result.value.mid() else { continue };
            if mid.is_zero() {
                continue;
            }
            let spread = match (result.value.best_bid(), result.value.best_ask()) {
                (Some(bid), Some(ask)) => ((ask - bid) / mid * Decimal::from(10_000)).to_f64().unwrap_or(0.0),
                _ => 0.0,
            };
            let coin_depth = result.value.depth_within_pct(Decimal::new(1, 2)).to_f64().unwrap_or(0.0);
            let slip = if coin_depth > 100.0 {
                spread * 0.3
            } else if coin_depth > 20.0 {
                spread * 0.5
            } else {
                spread * 0.8
            };
            spreads_bps.insert(coin.clone(), spread);
            depth.insert(coin.clone(), coin_depth);
            slippage.insert(coin.clone(), slip);
            succeeded += 1;
        }

        let confidence = SignalQualityMetadata::downweight_for_missing(coins.len(), succeeded);
        let sources = if succeeded > 0 { vec![PROVIDER_EXCHANGE.to_string()] } else { Vec::new() };
        FastBundle {
            spreads_bps,
            order_book_depth: depth,
            slippage_estimate_bps: slippage,
            short_term_volatility: 0.0,
            micro_pnl: 0.0,
            api_latency_ms: started.elapsed().as_secs_f64() * 1000.0,
            metadata: SignalQualityMetadata {
                timestamp: Utc::now(),
                confidence,
                staleness_seconds: 0.0,
                sources,
                is_cached: false,
            },
        }
    }

    /// Collects the medium bundle: candles/funding/OI per coin, updating the
    /// rolling buffers, then computing indicators where enough history
    /// exists.
    pub async fn collect_medium(&self, watchlist: &HashSet<String>, timeout: Duration) -> MediumBundle {
        let coins: Vec<String> = watchlist.iter().cloned().collect();
        let now = Utc::now();
        let start = now - chrono::Duration::days(7);

        let fetch_all = join_all(coins.iter().map(|coin| {
            let exchange = self.exchange.clone();
            let coin = coin.clone();
            async move {
                let candles = exchange.candles(&coin, "1h", start, now).await;
                let funding = exchange.funding_history(&coin, now - chrono::Duration::hours(24), now).await;
                let oi = exchange.open_interest(&coin).await;
                (coin, candles, funding, oi)
            }
        }));

        let results = match tokio::time::timeout(timeout, fetch_all).await {
            Ok(results) => results,
            Err(_) => Vec::new(),
        };

        let mut funding_basis = HashMap::new();
        let mut funding_rate_trend = HashMap::new();
        let mut oi_change = HashMap::new();
        let mut technical_indicators = HashMap::new();
        let mut succeeded = 0usize;
        let mut returns_for_vol = Vec::new();

        for (coin, candles_result, funding_result, oi_result) in results {
            let mut any_success = false;

            if candles_result.confidence > 0.0 && !candles_result.value.is_empty() {
                self.update_price_history(&coin, &candles_result.value).await;
                if let Some(indicators) = indicators::compute_indicators(&candles_result.value) {
                    technical_indicators.insert(coin.clone(), indicators);
                }
                let closes: Vec<f64> = candles_result.value.iter().filter_map(|c| c.close.to_f64()).collect();
                returns_for_vol.extend(closes.windows(2).map(|w| (w[1] - w[0]) / w[0].max(1e-9)));
                any_success = true;
            }

            if funding_result.confidence > 0.0 && !funding_result.value.is_empty() {
                let rates: Vec<f64> = funding_result.value.iter().map(|p| p.rate).collect();
                let latest = rates.last().copied().unwrap_or(0.0);
                funding_basis.insert(coin.clone(), latest);
                let mid = rates.len() / 2;
                if mid > 0 {
                    let first_half_mean = mean(&rates[..mid]);
                    let second_half_mean = mean(&rates[mid..]);
                    let trend = if first_half_mean.abs() > 1e-12 {
                        let ratio = second_half_mean / first_half_mean;
                        if ratio > 1.1 {
                            Trend::Increasing
                        } else if ratio < 0.9 {
                            Trend::Decreasing
                        } else {
                            Trend::Stable
                        }
                    } else {
                        Trend::Stable
                    };
                    funding_rate_trend.insert(coin.clone(), trend);
                }
                any_success = true;
            }

            if oi_result.confidence > 0.0 {
                if let Some(point) = oi_result.value {
                    self.update_oi_history(&coin, point.open_interest, point.timestamp).await;
                    if let Some(change) = self.oi_histories.read().await.get(&coin).and_then(|h| h.change_24h_pct(now)) {
                        oi_change.insert(coin.clone(), change);
                    }
                    any_success = true;
                }
            }

            if any_success {
                succeeded += 1;
            }
        }

        let realized_vol_24h = stddev(&returns_for_vol) * (6.0_f64).sqrt();
        let realized_vol_1h = stddev(&returns_for_vol.iter().rev().take(1).copied().collect::<Vec<_>>());
        let trend_score = technical_indicators
            .values()
            .map(|i| if i.sma_20 > i.sma_50 { 1.0 } else { -1.0 })
            .fold(0.0, |acc, v| acc + v)
            / (technical_indicators.len().max(1) as f64);

        let confidence = SignalQualityMetadata::downweight_for_missing(coins.len(), succeeded);
        let sources = if succeeded > 0 { vec![PROVIDER_EXCHANGE.to_string()] } else { Vec::new() };
        MediumBundle {
            realized_vol_1h,
            realized_vol_24h,
            trend_score: trend_score.clamp(-1.0, 1.0),
            funding_basis,
            funding_rate_trend,
            open_interest_change_24h: oi_change,
            oi_to_volume_ratio: 0.0,
            technical_indicators,
            metadata: SignalQualityMetadata { timestamp: now, confidence, staleness_seconds: 0.0, sources, is_cached: false },
        }
    }

    /// Collects the slow bundle: macro calendar, cross-asset correlation,
    /// sentiment, on-chain flows for the watchlist, plus the two
    /// account-anchored readings (liquidity regime off the largest position,
    /// venue health off the exchange's own meta call).
    pub async fn collect_slow(&self, watchlist: &HashSet<String>, account: &AccountState, timeout: Duration) -> SlowBundle {
        let coins: Vec<String> = watchlist.iter().cloned().collect();
        let work = async {
            let now = Utc::now();
            let (events, events_conf) = self.market_context.macro_events_upcoming(7).await;
            let (btc_eth, corr_conf) = self.market_context.btc_eth_correlation().await;
            let (btc_spx, _) = self.market_context.btc_spx_correlation().await;
            let (fear_greed, fg_conf) = self.sentiment.fear_greed_index().await;

            let mut unlocks = HashMap::new();
            let mut whale_flows = HashMap::new();
            let mut onchain_succeeded = 0usize;
            for coin in &coins {
                let (unlock, unlock_conf) = self.onchain.token_unlocks_7d(coin).await;
                let flow = self.onchain.whale_net_flow_24h(coin).await;
                if unlock_conf > 0.0 {
                    unlocks.insert(coin.clone(), unlock);
                }
                if flow.confidence > 0.0 {
                    whale_flows.insert(
                        coin.clone(),
                        WhaleFlow { inflow: flow.inflow, outflow: flow.outflow, net: flow.inflow - flow.outflow, tx_count: flow.tx_count },
                    );
                    onchain_succeeded += 1;
                }
            }

            // Liquidity regime is read off the largest position's own order-book
            // depth, not the watchlist's size — an unrelated proxy for how deep
            // the book actually is around the exposure that matters most.
            let largest_position = account.positions.iter().max_by_key(|p| p.notional());
            let largest_position_depth = match largest_position {
                Some(position) => {
                    let book = self.exchange.order_book(&position.coin).await;
                    book.value.depth_within_pct(Decimal::new(1, 2)).to_f64().unwrap_or(0.0)
                }
                None => 0.0,
            };
            let liquidity_regime = if largest_position_depth > 100.0 {
                LiquidityRegime::High
            } else if largest_position_depth > 20.0 {
                LiquidityRegime::Medium
            } else {
                LiquidityRegime::Low
            };

            // 7-day average BTC funding rate, scaled to a [-1, 1] risk-on score.
            let funding = self.exchange.funding_history("BTC", now - chrono::Duration::days(7), now).await;
            let avg_btc_funding = if funding.value.is_empty() {
                0.0
            } else {
                funding.value.iter().map(|p| p.rate).sum::<f64>() / funding.value.len() as f64
            };
            let cross_asset_risk_on_score = (avg_btc_funding * 10_000.0).clamp(-1.0, 1.0);

            let venue_health_score = self.exchange.venue_health().await;

            let mut sources = Vec::new();
            if events_conf > 0.0 || corr_conf > 0.0 {
                sources.push(PROVIDER_EXTERNAL_MARKET.to_string());
            }
            if fg_conf > 0.0 {
                sources.push(PROVIDER_SENTIMENT.to_string());
            }
            if onchain_succeeded > 0 {
                sources.push(PROVIDER_ONCHAIN.to_string());
            }
            if venue_health_score > 0.0 || funding.confidence > 0.0 || largest_position.is_some() {
                sources.push(PROVIDER_EXCHANGE.to_string());
            }

            let confidence =
                (events_conf + corr_conf + fg_conf + SignalQualityMetadata::downweight_for_missing(coins.len(), onchain_succeeded)) / 4.0;

            SlowBundle {
                macro_events_upcoming: events,
                cross_asset_risk_on_score,
                venue_health_score,
                liquidity_regime,
                btc_eth_correlation: btc_eth,
                btc_spx_correlation: btc_spx,
                fear_greed_index: fear_greed,
                token_unlocks_7d: unlocks,
                whale_flow_24h: whale_flows,
                metadata: SignalQualityMetadata { timestamp: Utc::now(), confidence, staleness_seconds: 0.0, sources, is_cached: false },
            }
        };

        match tokio::time::timeout(timeout, work).await {
            Ok(bundle) => bundle,
            Err(_) => SlowBundle {
                macro_events_upcoming: Vec::new(),
                cross_asset_risk_on_score: 0.0,
                venue_health_score: 0.0,
                liquidity_regime: LiquidityRegime::Low,
                btc_eth_correlation: 0.0,
                btc_spx_correlation: None,
                fear_greed_index: 0.0,
                token_unlocks_7d: HashMap::new(),
                whale_flow_24h: HashMap::new(),
                metadata: SignalQualityMetadata {
                    timestamp: Utc::now(),
                    confidence: 0.0,
                    staleness_seconds: 0.0,
                    sources: Vec::new(),
                    is_cached: false,
                },
            },
        }
    }

    async fn update_price_history(&self, coin: &str, candles: &[Candle]) {
        let mut histories = self.price_histories.write().await;
        let history = histories.entry(coin.to_string()).or_default();
        for candle in candles {
            history.push(candle.close, candle.high, candle.low, candle.timestamp);
        }
    }

    async fn update_oi_history(&self, coin: &str, value: Decimal, timestamp: DateTime<Utc>) {
        let mut histories = self.oi_histories.write().await;
        histories.entry(coin.to_string()).or_default().push(value, timestamp);
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cache::InMemoryCache;
    use crate::infrastructure::exchange::mock::MockExchangeClient;
    use crate::infrastructure::market_context::{MockExternalMarketProvider, MockOnChainProvider, MockSentimentProvider};
    use rust_decimal_macros::dec;

    fn orchestrator() -> SignalOrchestrator {
        let cache = Arc::new(InMemoryCache::new());
        let exchange = Arc::new(ExchangeProvider::new(Arc::new(MockExchangeClient::with_default_markets()), cache.clone()));
        let onchain = Arc::new(OnChainDataProvider::new(Arc::new(MockOnChainProvider), cache.clone()));
        let market_context = Arc::new(MarketContextProvider::new(Arc::new(MockExternalMarketProvider::default()), cache.clone()));
        let sentiment = Arc::new(FearGreedProvider::new(Arc::new(MockSentimentProvider::new()), cache));
        SignalOrchestrator::new(exchange, onchain, market_context, sentiment)
    }

    #[test]
    fn watchlist_always_includes_btc_and_eth() {
        let account = AccountState {
            portfolio_value: dec!(0),
            available_balance: dec!(0),
            positions: vec![],
            spot_balances: Default::default(),
            timestamp: Utc::now(),
            is_stale: false,
        };
        let watchlist = build_watchlist(&account, None);
        assert!(watchlist.contains("BTC"));
        assert!(watchlist.contains("ETH"));
    }

    #[test]
    fn price_history_returns_none_before_enough_entries() {
        let history = PriceHistory::default();
        assert!(history.returns_1d().is_none());
    }

    #[test]
    fn price_history_computes_return_over_lookback() {
        let mut history = PriceHistory::default();
        let now = Utc::now();
        for i in 0..10 {
            history.push(dec!(100) + Decimal::from(i), dec!(101) + Decimal::from(i), dec!(99) + Decimal::from(i), now);
        }
        let r = history.returns_1d().unwrap();
        assert!(r > 0.0);
    }

    #[tokio::test]
    async fn collect_fast_produces_nonzero_confidence_for_known_coins() {
        let orchestrator = orchestrator();
        let watchlist = HashSet::from(["BTC".to_string(), "ETH".to_string()]);
        let bundle = orchestrator.collect_fast(&watchlist, Duration::from_secs(5)).await;
        assert!(bundle.metadata.confidence > 0.0);
        assert!(bundle.spreads_bps.contains_key("BTC"));
        assert_eq!(bundle.metadata.sources, vec![PROVIDER_EXCHANGE.to_string()]);
    }

    #[tokio::test]
    async fn collect_medium_updates_rolling_price_history() {
        let orchestrator = orchestrator();
        let watchlist = HashSet::from(["BTC".to_string()]);
        let _bundle = orchestrator.collect_medium(&watchlist, Duration::from_secs(5)).await;
        let history = orchestrator.price_history_snapshot("BTC").await;
        assert!(history.is_some());
    }

    fn account_with_btc_position(size: Decimal) -> AccountState {
        AccountState {
            portfolio_value: dec!(100000),
            available_balance: dec!(40000),
            positions: vec![crate::domain::types::Position {
                coin: "BTC".to_string(),
                market_type: MarketType::Perp,
                size,
                entry_price: dec!(60000),
                current_price: dec!(60000),
                leverage: Some(dec!(2)),
            }],
            spot_balances: Default::default(),
            timestamp: Utc::now(),
            is_stale: false,
        }
    }

    #[tokio::test]
    async fn collect_slow_derives_liquidity_regime_from_largest_position_depth() {
        let orchestrator = orchestrator();
        let account = account_with_btc_position(dec!(1));
        let watchlist = HashSet::from(["BTC".to_string()]);
        let bundle = orchestrator.collect_slow(&watchlist, &account, Duration::from_secs(15)).await;
        // Mock BTC order book sums to 60 units of depth within 1% of mid: medium band (20, 100].
        assert_eq!(bundle.liquidity_regime, LiquidityRegime::Medium);
    }

    #[tokio::test]
    async fn collect_slow_with_no_positions_defaults_to_low_liquidity() {
        let orchestrator = orchestrator();
        let account = AccountState {
            portfolio_value: dec!(0),
            available_balance: dec!(0),
            positions: vec![],
            spot_balances: Default::default(),
            timestamp: Utc::now(),
            is_stale: false,
        };
        let watchlist = HashSet::from(["BTC".to_string()]);
        let bundle = orchestrator.collect_slow(&watchlist, &account, Duration::from_secs(15)).await;
        assert_eq!(bundle.liquidity_regime, LiquidityRegime::Low);
    }

    #[tokio::test]
    async fn collect_slow_derives_risk_on_score_from_btc_funding_not_correlation() {
        let orchestrator = orchestrator();
        let account = account_with_btc_position(dec!(1));
        let watchlist = HashSet::from(["BTC".to_string()]);
        let bundle = orchestrator.collect_slow(&watchlist, &account, Duration::from_secs(15)).await;
        // Mock funding rate is a constant 0.0001 per sample; 0.0001 * 10000 = 1.0, clamped.
        assert_eq!(bundle.cross_asset_risk_on_score, 1.0);
    }

    #[tokio::test]
    async fn collect_slow_derives_nonzero_venue_health_from_exchange_meta() {
        let orchestrator = orchestrator();
        let account = account_with_btc_position(dec!(1));
        let watchlist = HashSet::from(["BTC".to_string()]);
        let bundle = orchestrator.collect_slow(&watchlist, &account, Duration::from_secs(15)).await;
        assert!(bundle.venue_health_score > 0.0);
    }

    #[tokio::test]
    async fn collect_slow_sources_are_provider_ids_not_coin_tickers() {
        let orchestrator = orchestrator();
        let account = account_with_btc_position(dec!(1));
        let watchlist = HashSet::from(["BTC".to_string()]);
        let bundle = orchestrator.collect_slow(&watchlist, &account, Duration::from_secs(15)).await;
        for source in &bundle.metadata.sources {
            assert!(
                crate::domain::signals::KNOWN_PROVIDERS.contains(&source.as_str()),
                "{source} is not a known provider id"
            );
        }
    }
}
