use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use promissory_core::domain::fulfillment::GuardKey;
use promissory_core::errors::StoreError;
use promissory_core::ports::GuardStore;

use super::{decode_error, RepositoryError};
use crate::DbPool;

/// Dedup guards as rows with an absolute expiry in unix milliseconds.
///
/// `set_if_absent` is a single upsert that only overwrites an expired row, so
/// two racing callers cannot both observe `true` for a live key.
pub struct SqlGuardStore {
    pool: DbPool,
}

impl SqlGuardStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn try_acquire(&self, key: &GuardKey, ttl: Duration) -> Result<bool, RepositoryError> {
        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at_ms = now_ms.saturating_add(ttl_ms);

        let result = sqlx::query(
            "INSERT INTO delivery_guard (guard_key, expires_at_ms, acquired_at)
             VALUES (?, ?, ?)
             ON CONFLICT(guard_key) DO UPDATE SET
                expires_at_ms = excluded.expires_at_ms,
                acquired_at = excluded.acquired_at
             WHERE delivery_guard.expires_at_ms <= ?",
        )
        .bind(key.as_str())
        .bind(expires_at_ms)
        .bind(now.to_rfc3339())
        .bind(now_ms)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn is_live(&self, key: &GuardKey) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM delivery_guard
             WHERE guard_key = ? AND expires_at_ms > ?",
        )
        .bind(key.as_str())
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.try_get("count").map_err(decode_error)?;
        Ok(count > 0)
    }

    async fn remove(&self, key: &GuardKey) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM delivery_guard WHERE guard_key = ?")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes expired guards. Returns how many rows were removed.
    pub async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM delivery_guard WHERE expires_at_ms <= ?")
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl GuardStore for SqlGuardStore {
    async fn set_if_absent(&self, key: &GuardKey, ttl: Duration) -> Result<bool, StoreError> {
        Ok(self.try_acquire(key, ttl).await?)
    }

    async fn exists(&self, key: &GuardKey) -> Result<bool, StoreError> {
        Ok(self.is_live(key).await?)
    }

    async fn release(&self, key: &GuardKey) -> Result<(), StoreError> {
        Ok(self.remove(key).await?)
    }
}
