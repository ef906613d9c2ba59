//! SQLite-backed `Cache`: durable counterpart to `InMemoryCache` for
//! deployments that want provider responses to survive a restart. Same
//! never-propagate-errors contract: a query failure degrades to a Miss.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::warn;

use crate::application::cache::{Cache, CacheLookup, CacheMetrics};
use crate::infrastructure::persistence::database::Database;

fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

pub struct SqliteCache {
    db: Database,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SqliteCache {
    pub fn new(db: Database) -> Self {
        Self { db, hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }
}

#[async_trait]
impl Cache for SqliteCache {
    async fn get_raw(&self, key: &str) -> CacheLookup<String> {
        let row: Result<Option<(String, f64, f64)>, _> =
            sqlx::query_as("SELECT value, expires_at, created_at FROM cache_entries WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.db.pool)
                .await;

        let row = match row {
            Ok(row) => row,
            Err(err) => {
                warn!(%err, key, "cache read failed, treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                return CacheLookup::Miss;
            }
        };

        let Some((value, expires_at, created_at)) = row else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return CacheLookup::Miss;
        };

        let now = now_secs();
        if now > expires_at {
            self.misses.fetch_add(1, Ordering::Relaxed);
            let _ = sqlx::query("DELETE FROM cache_entries WHERE key = ?1").bind(key).execute(&self.db.pool).await;
            return CacheLookup::Miss;
        }

        let _ = sqlx::query("UPDATE cache_entries SET hit_count = hit_count + 1 WHERE key = ?1").bind(key).execute(&self.db.pool).await;
        self.hits.fetch_add(1, Ordering::Relaxed);
        CacheLookup::Hit { value, age_seconds: now - created_at }
    }

    async fn set_raw(&self, key: &str, value: String, ttl: std::time::Duration) {
        let now = now_secs();
        let expires_at = now + ttl.as_secs_f64();
        let result = sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, expires_at, created_at, hit_count)
            VALUES (?1, ?2, ?3, ?4, 0)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at, created_at = excluded.created_at, hit_count = 0
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .bind(now)
        .execute(&self.db.pool)
        .await;
        if let Err(err) = result {
            warn!(%err, key, "cache write failed");
        }
    }

    async fn invalidate(&self, pattern: &str) -> usize {
        let like = format!("%{pattern}%");
        match sqlx::query("DELETE FROM cache_entries WHERE key LIKE ?1").bind(like).execute(&self.db.pool).await {
            Ok(result) => result.rows_affected() as usize,
            Err(err) => {
                warn!(%err, pattern, "cache invalidate failed");
                0
            }
        }
    }

    async fn cleanup_expired(&self) -> usize {
        let now = now_secs();
        match sqlx::query("DELETE FROM cache_entries WHERE expires_at < ?1").bind(now).execute(&self.db.pool).await {
            Ok(result) => result.rows_affected() as usize,
            Err(err) => {
                warn!(%err, "cache cleanup_expired failed");
                0
            }
        }
    }

    fn metrics(&self) -> CacheMetrics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheMetrics {
            entries: 0,
            hits,
            misses,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            avg_age_seconds: 0.0,
            expired_entries: 0,
        }
    }
}
