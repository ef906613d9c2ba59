//! The snapshot writer: serializes one record per loop iteration to an
//! append-only store and prunes to the configured retention count. Never
//! aborts a loop — a write or prune failure is logged and swallowed, since
//! the snapshot log is diagnostic, not authoritative state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::domain::plan_card::PlanCard;
use crate::domain::regime::Regime;
use crate::domain::repositories::SnapshotRepository;
use crate::domain::types::AccountState;

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct GovernorMeta {
    pub active_plan_id: Option<uuid::Uuid>,
    pub rebalance_progress: f64,
    pub cooldown_deadline: Option<DateTime<Utc>>,
    pub shadow_portfolio_count: usize,
}

#[derive(Serialize)]
struct SnapshotRecord<'a> {
    schema_version: u32,
    loop_type: &'a str,
    captured_at: DateTime<Utc>,
    account_state: &'a AccountState,
    plan_card: Option<&'a PlanCard>,
    governor_meta: GovernorMeta,
    regime: Regime,
    tick: u64,
}

pub struct SnapshotWriter {
    repo: Arc<dyn SnapshotRepository>,
    retain_count: usize,
}

impl SnapshotWriter {
    pub fn new(repo: Arc<dyn SnapshotRepository>, retain_count: usize) -> Self {
        Self { repo, retain_count }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn write(
        &self,
        loop_type: &str,
        now: DateTime<Utc>,
        account: &AccountState,
        plan_card: Option<&PlanCard>,
        governor_meta: GovernorMeta,
        regime: Regime,
        tick: u64,
    ) {
        let record = SnapshotRecord {
            schema_version: SCHEMA_VERSION,
            loop_type,
            captured_at: now,
            account_state: account,
            plan_card,
            governor_meta,
            regime,
            tick,
        };

        let payload = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(err) => {
                warn!(%err, loop_type, "failed to serialize snapshot record, skipping write");
                return;
            }
        };

        if let Err(err) = self.repo.append(loop_type, now, &payload).await {
            warn!(%err, loop_type, "snapshot append failed");
            return;
        }

        if let Err(err) = self.repo.prune(loop_type, self.retain_count).await {
            warn!(%err, loop_type, "snapshot prune failed");
        }
    }

    pub async fn latest(&self, loop_type: &str, limit: usize) -> Vec<String> {
        match self.repo.latest(loop_type, limit).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(%err, loop_type, "snapshot read failed, returning empty history");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct InMemorySnapshotRepo {
        rows: StdMutex<HashMap<String, Vec<String>>>,
    }

    impl InMemorySnapshotRepo {
        fn new() -> Self {
            Self { rows: StdMutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl SnapshotRepository for InMemorySnapshotRepo {
        async fn append(&self, loop_type: &str, _captured_at: DateTime<Utc>, payload_json: &str) -> anyhow::Result<()> {
            self.rows.lock().unwrap().entry(loop_type.to_string()).or_default().push(payload_json.to_string());
            Ok(())
        }

        async fn latest(&self, loop_type: &str, limit: usize) -> anyhow::Result<Vec<String>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.get(loop_type).map(|v| v.iter().rev().take(limit).cloned().collect()).unwrap_or_default())
        }

        async fn prune(&self, loop_type: &str, retain: usize) -> anyhow::Result<()> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(entries) = rows.get_mut(loop_type) {
                while entries.len() > retain {
                    entries.remove(0);
                }
            }
            Ok(())
        }
    }

    fn account() -> AccountState {
        AccountState { portfolio_value: dec!(1000), available_balance: dec!(1000), positions: vec![], spot_balances: Default::default(), timestamp: Utc::now(), is_stale: false }
    }

    fn meta() -> GovernorMeta {
        GovernorMeta { active_plan_id: None, rebalance_progress: 0.0, cooldown_deadline: None, shadow_portfolio_count: 0 }
    }

    #[tokio::test]
    async fn writes_are_retrievable_and_pruned_to_retain_count() {
        let repo = Arc::new(InMemorySnapshotRepo::new());
        let writer = SnapshotWriter::new(repo.clone(), 2);
        for tick in 0..5 {
            writer.write("fast", Utc::now(), &account(), None, meta(), Regime::RangeBound, tick).await;
        }
        let latest = writer.latest("fast", 10).await;
        assert_eq!(latest.len(), 2);
    }
}
