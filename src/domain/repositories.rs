//! Repository trait abstractions for persisted state: the governor's own
//! lifecycle record and the append-only snapshot log. The cache layer has
//! its own `Cache` trait in `application::cache` since it is a runtime
//! concern rather than a repository in this sense.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::application::governor::GovernorState;

/// Persists the governor's full lifecycle state (active plan, change log,
/// cooldowns, shadow portfolios) so it survives a process restart.
#[async_trait]
pub trait GovernorRepository: Send + Sync {
    async fn save(&self, state: &GovernorState) -> Result<()>;
    async fn load(&self) -> Result<Option<GovernorState>>;
}

/// Append-only per-tick snapshot store, partitioned by loop type and
/// retaining only the latest N rows per partition.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn append(&self, loop_type: &str, captured_at: DateTime<Utc>, payload_json: &str) -> Result<()>;
    async fn latest(&self, loop_type: &str, limit: usize) -> Result<Vec<String>>;
    async fn prune(&self, loop_type: &str, retain: usize) -> Result<()>;
}
