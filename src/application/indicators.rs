//! Technical indicator computation over a candle history. Standard
//! indicators are fed through the `ta` crate's streaming implementations;
//! ADX and Bollinger-band position are hand-rolled ATR/trend-strength
//! helpers, since `ta` does not expose the exact definitions the medium
//! bundle needs.

use rust_decimal::prelude::ToPrimitive;
use ta::indicators::{
    BollingerBands, ExponentialMovingAverage, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
    SimpleMovingAverage,
};
use ta::Next;

use crate::domain::ports::Candle;
use crate::domain::signals::TechnicalIndicators;

pub const MIN_CANDLES_FOR_INDICATORS: usize = 50;

/// Compute the full indicator set from a closed-candle history. Returns
/// `None` if fewer than `MIN_CANDLES_FOR_INDICATORS` candles are present —
/// the caller downweights confidence accordingly rather than guessing.
pub fn compute_indicators(candles: &[Candle]) -> Option<TechnicalIndicators> {
    if candles.len() < MIN_CANDLES_FOR_INDICATORS {
        return None;
    }

    let mut rsi = RelativeStrengthIndex::new(14).ok()?;
    let mut macd = MovingAverageConvergenceDivergence::new(12, 26, 9).ok()?;
    let mut bb = BollingerBands::new(20, 2.0).ok()?;
    let mut sma_20 = SimpleMovingAverage::new(20).ok()?;
    let mut sma_50 = SimpleMovingAverage::new(50).ok()?;
    let mut ema_12 = ExponentialMovingAverage::new(12).ok()?;
    let mut ema_26 = ExponentialMovingAverage::new(26).ok()?;

    let (mut rsi_v, mut sma20_v, mut sma50_v, mut ema12_v, mut ema26_v) = (0.0, 0.0, 0.0, 0.0, 0.0);
    let mut macd_out = (0.0, 0.0, 0.0);
    let mut bb_out = (0.0, 0.0, 0.0);

    for candle in candles {
        let close = candle.close.to_f64().unwrap_or(0.0);
        rsi_v = rsi.next(close);
        let m = macd.next(close);
        macd_out = (m.macd, m.signal, m.histogram);
        let b = bb.next(close);
        bb_out = (b.upper, b.average, b.lower);
        sma20_v = sma_20.next(close);
        sma50_v = sma_50.next(close);
        ema12_v = ema_12.next(close);
        ema26_v = ema_26.next(close);
    }

    let adx = compute_adx(candles, 14);

    let (bb_upper, bb_middle, bb_lower) = bb_out;
    let bb_position = if bb_upper > bb_lower {
        ((candles.last()?.close.to_f64().unwrap_or(0.0) - bb_lower) / (bb_upper - bb_lower)).clamp(0.0, 1.0)
    } else {
        0.5
    };

    Some(TechnicalIndicators {
        rsi: rsi_v,
        macd: macd_out.0,
        macd_signal: macd_out.1,
        macd_histogram: macd_out.2,
        bb_upper,
        bb_middle,
        bb_lower,
        bb_position,
        sma_20: sma20_v,
        sma_50: sma50_v,
        ema_12: ema12_v,
        ema_26: ema26_v,
        adx,
    })
}

/// Wilder's average directional index over `period` candles, computed from
/// true range and directional movement the way a manual ATR pass would.
fn compute_adx(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < period + 1 {
        return 0.0;
    }

    let mut tr = Vec::with_capacity(candles.len() - 1);
    let mut plus_dm = Vec::with_capacity(candles.len() - 1);
    let mut minus_dm = Vec::with_capacity(candles.len() - 1);

    for w in candles.windows(2) {
        let (prev, cur) = (&w[0], &w[1]);
        let high = cur.high.to_f64().unwrap_or(0.0);
        let low = cur.low.to_f64().unwrap_or(0.0);
        let prev_close = prev.close.to_f64().unwrap_or(0.0);
        let prev_high = prev.high.to_f64().unwrap_or(0.0);
        let prev_low = prev.low.to_f64().unwrap_or(0.0);

        let true_range = (high - low).max((high - prev_close).abs()).max((low - prev_close).abs());
        tr.push(true_range);

        let up_move = high - prev_high;
        let down_move = prev_low - low;
        plus_dm.push(if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 });
        minus_dm.push(if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 });
    }

    if tr.len() < period {
        return 0.0;
    }

    let smooth = |values: &[f64]| -> Vec<f64> {
        let mut smoothed = Vec::with_capacity(values.len());
        let mut running: f64 = values[..period].iter().sum();
        smoothed.push(running);
        for &v in &values[period..] {
            running = running - running / period as f64 + v;
            smoothed.push(running);
        }
        smoothed
    };

    let tr_smooth = smooth(&tr);
    let plus_smooth = smooth(&plus_dm);
    let minus_smooth = smooth(&minus_dm);

    let dx: Vec<f64> = tr_smooth
        .iter()
        .zip(plus_smooth.iter())
        .zip(minus_smooth.iter())
        .map(|((&tr, &plus), &minus)| {
            if tr == 0.0 {
                return 0.0;
            }
            let plus_di = 100.0 * plus / tr;
            let minus_di = 100.0 * minus / tr;
            let sum = plus_di + minus_di;
            if sum == 0.0 { 0.0 } else { 100.0 * (plus_di - minus_di).abs() / sum }
        })
        .collect();

    if dx.is_empty() {
        return 0.0;
    }
    dx.iter().sum::<f64>() / dx.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn candle(close: rust_decimal::Decimal, high: rust_decimal::Decimal, low: rust_decimal::Decimal) -> Candle {
        Candle { open: close, high, low, close, volume: dec!(1000), timestamp: Utc::now() }
    }

    #[test]
    fn fewer_than_minimum_candles_returns_none() {
        let candles: Vec<Candle> = (0..10).map(|i| candle(dec!(100) + rust_decimal::Decimal::from(i), dec!(101), dec!(99))).collect();
        assert!(compute_indicators(&candles).is_none());
    }

    #[test]
    fn trending_series_yields_high_rsi_and_bb_position() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let price = dec!(100) + rust_decimal::Decimal::from(i);
                candle(price, price + dec!(1), price - dec!(1))
            })
            .collect();
        let indicators = compute_indicators(&candles).unwrap();
        assert!(indicators.rsi > 60.0, "expected strong uptrend rsi, got {}", indicators.rsi);
        assert!(indicators.bb_position > 0.5);
    }

    #[test]
    fn flat_series_has_near_zero_adx() {
        let candles: Vec<Candle> = (0..60).map(|_| candle(dec!(100), dec!(100.5), dec!(99.5))).collect();
        let adx = compute_adx(&candles, 14);
        assert!(adx < 5.0, "expected near-zero adx for flat series, got {adx}");
    }
}
