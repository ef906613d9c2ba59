//! The `governor` binary: headless CLI over the governance core. No UI, no
//! HTTP server — metrics are pushed as structured JSON logs to stdout (see
//! `infrastructure::observability`).
//!
//! Exit codes: `0` success, `1` configuration error, `2` runtime fatal,
//! `130` SIGINT.

use std::process::ExitCode;

use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use governor_core::application::bootstrap::Runtime;
use governor_core::application::indicators::compute_indicators;
use governor_core::config::GovernorConfig;
use governor_core::domain::ports::{ExchangeClient, StrategyAdvisor};
use governor_core::domain::regime::RegimeSignals;
use governor_core::interfaces::cli::{Cli, Command};
use rust_decimal::prelude::ToPrimitive;
use tracing::{error, info, Level};
use tracing_subscriber::prelude::*;

const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_RUNTIME_FATAL: u8 = 2;
const EXIT_SIGINT: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let cli = Cli::parse();

    let config = match GovernorConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "configuration error");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Interrupted) => ExitCode::from(EXIT_SIGINT),
        Err(RunError::Fatal(err)) => {
            error!(%err, "runtime fatal");
            ExitCode::from(EXIT_RUNTIME_FATAL)
        }
    }
}

enum RunError {
    Interrupted,
    Fatal(anyhow::Error),
}

impl From<anyhow::Error> for RunError {
    fn from(err: anyhow::Error) -> Self {
        RunError::Fatal(err)
    }
}

async fn run(cli: Cli, config: GovernorConfig) -> Result<(), RunError> {
    match cli.command {
        Command::Start { governed: _, sync } => {
            info!(version = env!("CARGO_PKG_VERSION"), "governor starting");
            let runtime = Runtime::build(&config).await?;

            let metrics = governor_core::infrastructure::observability::Metrics::new()?;
            if config.observability.enabled {
                let reporter = governor_core::infrastructure::observability::MetricsReporter::new(
                    runtime.exchange.clone(),
                    runtime.governor.clone(),
                    runtime.regime_detector.clone(),
                    runtime.cache.clone(),
                    metrics,
                    config.observability.interval_seconds,
                );
                tokio::spawn(async move { reporter.run().await });
            }

            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            let scheduler = runtime.scheduler.clone();
            let loop_handle = tokio::spawn(async move { scheduler.run(sync, shutdown_rx).await });

            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.map_err(|e| RunError::Fatal(e.into()))?;
                    info!("shutdown signal received");
                    let _ = shutdown_tx.send(true);
                    let _ = loop_handle.await;
                    return Err(RunError::Interrupted);
                }
                result = loop_handle => {
                    result.map_err(|e| RunError::Fatal(anyhow::anyhow!("scheduler task panicked: {e}")))?;
                }
            }
            Ok(())
        }

        Command::Status => {
            let runtime = Runtime::build(&config).await?;
            let account = runtime.exchange.account_state().await?;
            println!("{}", serde_json::to_string_pretty(&account)?);
            Ok(())
        }

        Command::GovPlan => {
            let runtime = Runtime::build(&config).await?;
            let snapshot = runtime.governor.snapshot().await;
            match snapshot.active_plan {
                Some(plan) => println!("{}", serde_json::to_string_pretty(&plan)?),
                None => println!("{{\"active_plan\": null}}"),
            }
            Ok(())
        }

        Command::GovRegime => {
            let runtime = Runtime::build(&config).await?;
            let current = runtime.regime_detector.current_regime().await;
            let history = runtime.regime_detector.history(20).await;
            let report = serde_json::json!({
                "current_regime": current.to_string(),
                "event_locked": runtime.regime_detector.is_event_locked().await,
                "history": history,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }

        Command::GovTripwire => {
            let account = Runtime::build(&config).await?.exchange.account_state().await?;
            let report = serde_json::json!({
                "thresholds": {
                    "min_margin_ratio": config.risk.min_margin_ratio,
                    "liquidation_proximity_threshold": config.risk.liquidation_proximity_threshold,
                    "daily_loss_limit_pct": config.risk.daily_loss_limit_pct,
                    "max_data_staleness_seconds": config.risk.max_data_staleness_seconds,
                    "max_api_failure_count": config.risk.max_api_failure_count,
                },
                "account_is_stale": account.is_stale,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }

        Command::GovMetrics => {
            let runtime = Runtime::build(&config).await?;
            let snapshot = runtime.governor.snapshot().await;
            let report = serde_json::json!({
                "active_plan_id": snapshot.active_plan.as_ref().map(|p| p.plan_id.to_string()),
                "rebalance_progress": snapshot.rebalance_progress,
                "shadow_portfolios": snapshot.shadow_portfolios,
                "plan_metrics": snapshot.plan_metrics,
                "change_log": snapshot.change_log,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }

        Command::Backtest { start_date, end_date, interval, assets, clear_cache } => {
            let runtime = Runtime::build(&config).await?;
            if clear_cache {
                runtime.cache.invalidate("").await;
            }

            let start = parse_date(&start_date).map_err(|e| RunError::Fatal(anyhow::anyhow!(e)))?;
            let end = parse_date(&end_date).map_err(|e| RunError::Fatal(anyhow::anyhow!(e)))?;
            let assets = if assets.is_empty() { vec!["BTC".to_string()] } else { assets };

            let report = backtest(runtime.exchange.as_ref(), runtime.advisor.as_ref(), &assets, start, end, &interval).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn parse_date(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")?;
    Ok(date.and_hms_opt(0, 0, 0).unwrap().and_utc())
}

/// Replays the regime detector's classification over historical candles.
/// Indicators and funding are reconstructed per asset; spread/depth have no
/// historical record in this crate's scope, so they are held at zero — a
/// known simplification relative to the live fast bundle (see DESIGN.md).
async fn backtest(
    exchange: &dyn ExchangeClient,
    advisor: &dyn StrategyAdvisor,
    assets: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: &str,
) -> anyhow::Result<serde_json::Value> {
    use std::collections::HashMap;
    let mut per_asset = serde_json::Map::new();

    for coin in assets {
        let candles = exchange.fetch_candles(coin, interval, start, end).await?;
        let funding = exchange.fetch_funding_history(coin, start, end).await?;
        let avg_funding = if funding.is_empty() { 0.0 } else { funding.iter().map(|f| f.rate).sum::<f64>() / funding.len() as f64 };

        let mut regime_counts: HashMap<String, usize> = HashMap::new();
        let mut transitions = 0usize;
        let mut previous: Option<String> = None;

        const WINDOW: usize = governor_core::application::indicators::MIN_CANDLES_FOR_INDICATORS;
        if candles.len() >= WINDOW {
            for end_idx in WINDOW..=candles.len() {
                let window = &candles[end_idx - WINDOW..end_idx];
                let Some(indicators) = compute_indicators(window) else { continue };
                let returns: Vec<f64> = window
                    .windows(2)
                    .map(|pair| (pair[1].close / pair[0].close).to_f64().unwrap_or(1.0) - 1.0)
                    .collect();
                let mean = returns.iter().sum::<f64>() / returns.len().max(1) as f64;
                let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len().max(1) as f64;
                let realized_vol_24h = variance.sqrt();

                let signals = RegimeSignals {
                    adx: indicators.adx,
                    sma_20: indicators.sma_20,
                    sma_50: indicators.sma_50,
                    realized_vol_24h,
                    weighted_funding: avg_funding,
                    avg_spread_bps: 0.0,
                    avg_depth: 0.0,
                };

                let regime = advisor.classify_regime(&signals).await?.to_string();
                *regime_counts.entry(regime.clone()).or_insert(0) += 1;
                if previous.as_deref() != Some(regime.as_str()) {
                    if previous.is_some() {
                        transitions += 1;
                    }
                    previous = Some(regime);
                }
            }
        }

        per_asset.insert(
            coin.clone(),
            serde_json::json!({
                "candles_fetched": candles.len(),
                "regime_counts": regime_counts,
                "regime_transitions": transitions,
                "avg_funding_rate": avg_funding,
            }),
        );
    }

    Ok(serde_json::json!({
        "start_date": start.to_rfc3339(),
        "end_date": end.to_rfc3339(),
        "interval": interval,
        "assets": per_asset,
    }))
}
