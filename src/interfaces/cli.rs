//! `clap` derive definitions for the `governor` binary's command surface.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "governor", about = "Autonomous trading-agent governance core", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the fast/medium/slow loop scheduler until interrupted.
    Start {
        /// Use the rule-based advisor even when LLM credentials are configured.
        #[arg(long)]
        governed: bool,
        /// Run loops inline on the current task instead of spawned (no crash isolation).
        #[arg(long)]
        sync: bool,
    },
    /// Print the current account state summary.
    Status,
    /// Print the active plan card.
    GovPlan,
    /// Print the current regime and recent classification history.
    GovRegime,
    /// Print currently active tripwires and their configured thresholds.
    GovTripwire,
    /// Print per-plan execution and adherence metrics.
    GovMetrics,
    /// Replay the regime detector over historical signals.
    Backtest {
        #[arg(long)]
        start_date: String,
        #[arg(long)]
        end_date: String,
        #[arg(long, default_value = "1h")]
        interval: String,
        #[arg(long, value_delimiter = ',')]
        assets: Vec<String>,
        #[arg(long)]
        clear_cache: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_parses_with_flags() {
        let cli = Cli::parse_from(["governor", "start", "--governed", "--sync"]);
        match cli.command {
            Command::Start { governed, sync } => {
                assert!(governed);
                assert!(sync);
            }
            _ => panic!("expected Start"),
        }
    }

    #[test]
    fn backtest_parses_comma_separated_assets() {
        let cli = Cli::parse_from([
            "governor",
            "backtest",
            "--start-date",
            "2026-01-01",
            "--end-date",
            "2026-02-01",
            "--assets",
            "BTC,ETH",
        ]);
        match cli.command {
            Command::Backtest { assets, interval, .. } => {
                assert_eq!(assets, vec!["BTC".to_string(), "ETH".to_string()]);
                assert_eq!(interval, "1h");
            }
            _ => panic!("expected Backtest"),
        }
    }
}
