//! Prometheus metric definitions for the governor core.
//!
//! All metrics use the `governor_` prefix. These are never scraped over
//! HTTP — `MetricsReporter` renders them into the periodic JSON log line
//! instead (see `reporter.rs`); the `Registry`/`TextEncoder` plumbing is
//! kept so `render()` stays available for anyone wiring a scrape endpoint
//! on top later.

use prometheus::{
    core::{AtomicF64, GenericGauge, GenericGaugeVec},
    CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Prometheus metrics for the governance loop
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Total portfolio value in USD
    pub portfolio_value_usd: GenericGauge<AtomicF64>,
    /// Position value per coin
    pub position_value_usd: GenericGaugeVec<AtomicF64>,
    /// Fraction of the active plan's rebalance completed, `[0, 1]`
    pub rebalance_progress: GenericGauge<AtomicF64>,
    /// Seconds remaining on the post-change cooldown, `0` if none active
    pub cooldown_remaining_seconds: GenericGauge<AtomicF64>,
    /// Seconds remaining before the active plan clears its dwell floor
    pub dwell_remaining_seconds: GenericGauge<AtomicF64>,
    /// One-hot gauge over the closed regime set: `1` for the current regime
    pub regime_current: GenericGaugeVec<AtomicF64>,
    /// Tripwire events fired, by category and severity
    pub tripwire_events_total: CounterVec,
    /// Signal bundle confidence by loop (fast/medium/slow)
    pub bundle_confidence: GenericGaugeVec<AtomicF64>,
    /// Per-source API latency by loop
    pub api_latency_ms: HistogramVec,
    /// Cache hit rate, `[0, 1]`
    pub cache_hit_rate: GenericGauge<AtomicF64>,
    /// Number of tracked shadow portfolios
    pub shadow_portfolio_count: GenericGauge<AtomicF64>,
    /// Orders placed, by side and outcome
    pub orders_total: CounterVec,
}

impl Metrics {
    /// Create a new Metrics instance with all gauges and counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let portfolio_value_usd = Gauge::with_opts(Opts::new(
            "governor_portfolio_value_usd",
            "Total portfolio value in USD",
        ))?;
        registry.register(Box::new(portfolio_value_usd.clone()))?;

        let position_value_usd = GaugeVec::new(
            Opts::new("governor_position_value_usd", "Position value per coin in USD"),
            &["coin"],
        )?;
        registry.register(Box::new(position_value_usd.clone()))?;

        let rebalance_progress = Gauge::with_opts(Opts::new(
            "governor_rebalance_progress",
            "Fraction of the active plan's rebalance completed",
        ))?;
        registry.register(Box::new(rebalance_progress.clone()))?;

        let cooldown_remaining_seconds = Gauge::with_opts(Opts::new(
            "governor_cooldown_remaining_seconds",
            "Seconds remaining on the post-change cooldown",
        ))?;
        registry.register(Box::new(cooldown_remaining_seconds.clone()))?;

        let dwell_remaining_seconds = Gauge::with_opts(Opts::new(
            "governor_dwell_remaining_seconds",
            "Seconds remaining before the active plan clears its dwell floor",
        ))?;
        registry.register(Box::new(dwell_remaining_seconds.clone()))?;

        let regime_current = GaugeVec::new(
            Opts::new("governor_regime_current", "One-hot gauge over the closed regime set"),
            &["regime"],
        )?;
        registry.register(Box::new(regime_current.clone()))?;

        let tripwire_events_total = CounterVec::new(
            Opts::new("governor_tripwire_events_total", "Tripwire events fired, by category and severity"),
            &["category", "severity"],
        )?;
        registry.register(Box::new(tripwire_events_total.clone()))?;

        let bundle_confidence = GaugeVec::new(
            Opts::new("governor_bundle_confidence", "Signal bundle confidence by loop"),
            &["loop_type"],
        )?;
        registry.register(Box::new(bundle_confidence.clone()))?;

        let api_latency_ms = HistogramVec::new(
            HistogramOpts::new("governor_api_latency_ms", "Provider API latency in milliseconds")
                .buckets(vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]),
            &["loop_type"],
        )?;
        registry.register(Box::new(api_latency_ms.clone()))?;

        let cache_hit_rate = Gauge::with_opts(Opts::new("governor_cache_hit_rate", "Cache hit rate"))?;
        registry.register(Box::new(cache_hit_rate.clone()))?;

        let shadow_portfolio_count = Gauge::with_opts(Opts::new(
            "governor_shadow_portfolio_count",
            "Number of tracked shadow portfolios",
        ))?;
        registry.register(Box::new(shadow_portfolio_count.clone()))?;

        let orders_total = CounterVec::new(
            Opts::new("governor_orders_total", "Orders placed, by side and outcome"),
            &["side", "outcome"],
        )?;
        registry.register(Box::new(orders_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            portfolio_value_usd,
            position_value_usd,
            rebalance_progress,
            cooldown_remaining_seconds,
            dwell_remaining_seconds,
            regime_current,
            tripwire_events_total,
            bundle_confidence,
            api_latency_ms,
            cache_hit_rate,
            shadow_portfolio_count,
            orders_total,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families).unwrap_or_default()
    }

    /// Updates the per-coin position value gauge
    pub fn set_position_value(&self, coin: &str, value: f64) {
        self.position_value_usd.with_label_values(&[coin]).set(value);
    }

    /// Sets the one-hot regime gauge: `regime` to `1`, every other member of
    /// `all_regimes` to `0`.
    pub fn set_current_regime(&self, regime: &str, all_regimes: &[&str]) {
        for candidate in all_regimes {
            self.regime_current.with_label_values(&[candidate]).set(if *candidate == regime { 1.0 } else { 0.0 });
        }
    }

    /// Increments the tripwire event counter
    pub fn inc_tripwire_event(&self, category: &str, severity: &str) {
        self.tripwire_events_total.with_label_values(&[category, severity]).inc();
    }

    /// Sets bundle confidence for one loop (fast/medium/slow)
    pub fn set_bundle_confidence(&self, loop_type: &str, confidence: f64) {
        self.bundle_confidence.with_label_values(&[loop_type]).set(confidence);
    }

    /// Observes one API call's latency for a loop
    pub fn observe_api_latency(&self, loop_type: &str, latency_ms: f64) {
        self.api_latency_ms.with_label_values(&[loop_type]).observe(latency_ms);
    }

    /// Increments the order placement counter
    pub fn inc_orders(&self, side: &str, outcome: &str) {
        self.orders_total.with_label_values(&[side, outcome]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create default Metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        assert!(metrics.render().contains("governor_"));
    }

    #[test]
    fn test_portfolio_value_update() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.portfolio_value_usd.set(50000.0);
        let output = metrics.render();
        assert!(output.contains("governor_portfolio_value_usd 50000"));
    }

    #[test]
    fn test_position_value_per_coin() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.set_position_value("BTC", 10000.0);
        metrics.set_position_value("ETH", 8000.0);
        let output = metrics.render();
        assert!(output.contains("governor_position_value_usd"));
        assert!(output.contains("BTC"));
        assert!(output.contains("ETH"));
    }

    #[test]
    fn test_one_hot_regime_gauge() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        let all = ["trending-bull", "trending-bear", "range-bound", "carry-friendly", "event-risk"];
        metrics.set_current_regime("range-bound", &all);
        let output = metrics.render();
        assert!(output.contains(r#"regime="range-bound"} 1"#));
        assert!(output.contains(r#"regime="event-risk"} 0"#));
    }

    #[test]
    fn test_tripwire_event_counter() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.inc_tripwire_event("margin_ratio", "critical");
        let output = metrics.render();
        assert!(output.contains("governor_tripwire_events_total"));
    }
}
