//! SQLite-backed `GovernorRepository`: the governor's lifecycle state
//! serialized whole as one JSON blob in a singleton row, rather than spread
//! across columns — the record only ever has one reader (the governor
//! itself, at startup) so there is no query surface to optimize for.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::application::governor::GovernorState;
use crate::domain::repositories::GovernorRepository;
use crate::infrastructure::persistence::database::Database;

pub struct SqliteGovernorRepository {
    db: Database,
}

impl SqliteGovernorRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GovernorRepository for SqliteGovernorRepository {
    async fn save(&self, state: &GovernorState) -> Result<()> {
        let state_json = serde_json::to_string(state).context("serializing governor state")?;
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO governor_state (id, state_json, updated_at)
            VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET state_json = excluded.state_json, updated_at = excluded.updated_at
            "#,
        )
        .bind(state_json)
        .bind(now)
        .execute(&self.db.pool)
        .await
        .context("persisting governor state")?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<GovernorState>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT state_json FROM governor_state WHERE id = 1")
            .fetch_optional(&self.db.pool)
            .await
            .context("loading governor state")?;
        match row {
            Some((json,)) => {
                let state = serde_json::from_str(&json).context("deserializing governor state")?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }
}
