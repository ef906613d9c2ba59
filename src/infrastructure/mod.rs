//! Adapters for the ports declared in `domain::ports`/`domain::repositories`:
//! the mock exchange, the mock market-context/sentiment/on-chain providers,
//! SQLite-backed persistence, and push-based observability.

pub mod exchange;
pub mod market_context;
pub mod observability;
pub mod persistence;
