//! SQLite-backed `SnapshotRepository`: append-only per-loop rows, pruned to
//! the configured retention count per `loop_type` partition.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::repositories::SnapshotRepository;
use crate::infrastructure::persistence::database::Database;

pub struct SqliteSnapshotRepository {
    db: Database,
}

impl SqliteSnapshotRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SnapshotRepository for SqliteSnapshotRepository {
    async fn append(&self, loop_type: &str, captured_at: DateTime<Utc>, payload_json: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (loop_type, captured_at, schema_version, payload_json)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(loop_type)
        .bind(captured_at.to_rfc3339())
        .bind(1_i64)
        .bind(payload_json)
        .execute(&self.db.pool)
        .await
        .context("appending snapshot row")?;
        Ok(())
    }

    async fn latest(&self, loop_type: &str, limit: usize) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT payload_json FROM snapshots WHERE loop_type = ?1 ORDER BY id DESC LIMIT ?2",
        )
        .bind(loop_type)
        .bind(limit as i64)
        .fetch_all(&self.db.pool)
        .await
        .context("reading latest snapshots")?;
        Ok(rows.into_iter().map(|(json,)| json).collect())
    }

    async fn prune(&self, loop_type: &str, retain: usize) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM snapshots
            WHERE loop_type = ?1 AND id NOT IN (
                SELECT id FROM snapshots WHERE loop_type = ?1 ORDER BY id DESC LIMIT ?2
            )
            "#,
        )
        .bind(loop_type)
        .bind(retain as i64)
        .execute(&self.db.pool)
        .await
        .context("pruning snapshot rows")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> SqliteSnapshotRepository {
        let db = Database::new("sqlite::memory:").await.expect("db should open");
        SqliteSnapshotRepository::new(db)
    }

    #[tokio::test]
    async fn append_then_latest_returns_newest_first() {
        let repo = repo().await;
        repo.append("fast", Utc::now(), r#"{"tick":0}"#).await.unwrap();
        repo.append("fast", Utc::now(), r#"{"tick":1}"#).await.unwrap();
        let latest = repo.latest("fast", 10).await.unwrap();
        assert_eq!(latest, vec![r#"{"tick":1}"#, r#"{"tick":0}"#]);
    }

    #[tokio::test]
    async fn prune_keeps_only_retain_count_per_loop_type() {
        let repo = repo().await;
        for tick in 0..5 {
            repo.append("fast", Utc::now(), &format!(r#"{{"tick":{tick}}}"#)).await.unwrap();
        }
        repo.append("medium", Utc::now(), r#"{"tick":0}"#).await.unwrap();
        repo.prune("fast", 2).await.unwrap();
        assert_eq!(repo.latest("fast", 10).await.unwrap().len(), 2);
        assert_eq!(repo.latest("medium", 10).await.unwrap().len(), 1);
    }
}
