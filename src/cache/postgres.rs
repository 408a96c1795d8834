//! Postgres-backed key-value store
//!
//! Shared between processes. Expiry is evaluated against the injected clock
//! on read, so expired rows are invisible without a sweeper; rows are
//! overwritten in place on the next write to the same key.

use super::KvStore;
use crate::clock::Clock;
use crate::error::AgentError;
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

pub struct PostgresStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
    clock: Arc<dyn Clock>,
}

impl PostgresStore {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
            clock,
        }
    }

    /// Create a lazily-connecting pool; nothing touches the network until
    /// the first operation.
    pub fn connect_lazy(url: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)?;
        Ok(Self::new(pool, clock))
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS kv_cache (
                      key TEXT PRIMARY KEY,
                      value BYTEA NOT NULL,
                      expires_at TIMESTAMPTZ
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AgentError::Store(format!("Failed to initialize kv_cache schema: {}", e))
            })?;

        Ok(())
    }

    fn deadline(&self, ttl: Duration) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[async_trait::async_trait]
impl KvStore for PostgresStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            r#"
            SELECT value FROM kv_cache
            WHERE key = $1 AND (expires_at IS NULL OR expires_at > $2)
            "#,
        )
        .bind(key)
        .bind(self.clock.now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AgentError::Store(format!("Failed to read '{}': {}", key, e)))?;

        Ok(row
            .map(|row| row.try_get::<Vec<u8>, _>("value"))
            .transpose()?)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO kv_cache (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
              SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(self.deadline(ttl))
        .execute(&self.pool)
        .await
        .map_err(|e| AgentError::Store(format!("Failed to write '{}': {}", key, e)))?;

        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.ensure_schema().await?;

        // An expired row restarts at 1 with no expiry, like a fresh key.
        let row = sqlx::query(
            r#"
            INSERT INTO kv_cache (key, value, expires_at)
            VALUES ($1, convert_to('1', 'UTF8'), NULL)
            ON CONFLICT (key) DO UPDATE SET
              value = CASE
                WHEN kv_cache.expires_at IS NOT NULL AND kv_cache.expires_at <= $2
                  THEN convert_to('1', 'UTF8')
                ELSE convert_to(
                  (COALESCE(NULLIF(convert_from(kv_cache.value, 'UTF8'), ''), '0')::BIGINT + 1)::TEXT,
                  'UTF8')
              END,
              expires_at = CASE
                WHEN kv_cache.expires_at IS NOT NULL AND kv_cache.expires_at <= $2 THEN NULL
                ELSE kv_cache.expires_at
              END
            RETURNING convert_from(value, 'UTF8') AS counter
            "#,
        )
        .bind(key)
        .bind(self.clock.now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AgentError::Store(format!("Failed to increment '{}': {}", key, e)))?;

        let counter: String = row.try_get("counter")?;
        counter.trim().parse::<i64>().map_err(|_| {
            AgentError::Store(format!("Counter '{}' holds a non-integer value", key))
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            UPDATE kv_cache SET expires_at = $2
            WHERE key = $1 AND (expires_at IS NULL OR expires_at > $3)
            "#,
        )
        .bind(key)
        .bind(self.deadline(ttl))
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(|e| AgentError::Store(format!("Failed to expire '{}': {}", key, e)))?;

        Ok(())
    }
}
