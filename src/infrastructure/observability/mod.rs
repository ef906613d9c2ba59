//! Push-based observability for the governor core.
//!
//! This module provides observability through outbound data only — no HTTP
//! server, no incoming requests. Metrics surface as structured JSON log
//! lines on a fixed interval (`MetricsReporter`), with the underlying
//! Prometheus registry (`Metrics`) kept available for anyone wiring a scrape
//! endpoint on top.

pub mod latency_tracker;
pub mod metrics;
pub mod reporter;

pub use latency_tracker::LatencyGuard;
pub use metrics::Metrics;
pub use reporter::MetricsReporter;
