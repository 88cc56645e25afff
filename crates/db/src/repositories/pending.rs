use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use promissory_core::domain::asset::AssetType;
use promissory_core::domain::fulfillment::{FulfillmentRecord, FulfillmentStatus};
use promissory_core::domain::lead::{LeadId, TenantId};
use promissory_core::domain::signal::PendingPromise;
use promissory_core::errors::StoreError;
use promissory_core::ports::PendingFulfillmentStore;

use super::{decode_error, parse_asset_type, parse_timestamp, RepositoryError};
use crate::DbPool;

/// Pending queue and fulfillment history backed by SQLite. Each mutation is
/// its own statement or transaction; nothing is cached between calls.
pub struct SqlPendingFulfillmentStore {
    pool: DbPool,
}

impl SqlPendingFulfillmentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        promise: &PendingPromise,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO lead_pending_promise
                (tenant_id, lead_id, asset_type, confidence, origin_text, detected_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, lead_id, asset_type) DO NOTHING",
        )
        .bind(&tenant_id.0)
        .bind(&lead_id.0)
        .bind(promise.asset_type.as_str())
        .bind(promise.confidence.clamp(0.0, 1.0))
        .bind(&promise.origin_text)
        .bind(promise.detected_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn select_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<PendingPromise>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT asset_type, confidence, origin_text, detected_at
             FROM lead_pending_promise
             WHERE tenant_id = ? AND lead_id = ?",
        )
        .bind(&tenant_id.0)
        .bind(&lead_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut pending = rows.iter().map(row_to_pending).collect::<Result<Vec<_>, _>>()?;
        pending.sort_by_key(|promise| promise.asset_type);
        Ok(pending)
    }

    async fn append_record(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        record: &FulfillmentRecord,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM lead_pending_promise
             WHERE tenant_id = ? AND lead_id = ? AND asset_type = ?",
        )
        .bind(&tenant_id.0)
        .bind(&lead_id.0)
        .bind(record.asset_type.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO lead_fulfillment_record
                (tenant_id, lead_id, asset_type, status, message_id, destination, detail, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&tenant_id.0)
        .bind(&lead_id.0)
        .bind(record.asset_type.as_str())
        .bind(record.status.as_str())
        .bind(&record.message_id)
        .bind(&record.destination)
        .bind(&record.detail)
        .bind(record.recorded_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        asset_type: Option<AssetType>,
    ) -> Result<u64, RepositoryError> {
        let result = match asset_type {
            Some(asset_type) => {
                sqlx::query(
                    "DELETE FROM lead_pending_promise
                     WHERE tenant_id = ? AND lead_id = ? AND asset_type = ?",
                )
                .bind(&tenant_id.0)
                .bind(&lead_id.0)
                .bind(asset_type.as_str())
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query("DELETE FROM lead_pending_promise WHERE tenant_id = ? AND lead_id = ?")
                    .bind(&tenant_id.0)
                    .bind(&lead_id.0)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn select_history(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<FulfillmentRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT asset_type, status, message_id, destination, detail, recorded_at
             FROM lead_fulfillment_record
             WHERE tenant_id = ? AND lead_id = ?
             ORDER BY id ASC",
        )
        .bind(&tenant_id.0)
        .bind(&lead_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_pending(row: &sqlx::sqlite::SqliteRow) -> Result<PendingPromise, RepositoryError> {
    let asset_type: String = row.try_get("asset_type").map_err(decode_error)?;
    let confidence: f64 = row.try_get("confidence").map_err(decode_error)?;
    let origin_text: String = row.try_get("origin_text").map_err(decode_error)?;
    let detected_at: String = row.try_get("detected_at").map_err(decode_error)?;

    Ok(PendingPromise {
        asset_type: parse_asset_type(&asset_type)?,
        confidence,
        origin_text,
        detected_at: parse_timestamp(&detected_at)?,
    })
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<FulfillmentRecord, RepositoryError> {
    let asset_type: String = row.try_get("asset_type").map_err(decode_error)?;
    let status: String = row.try_get("status").map_err(decode_error)?;
    let message_id: Option<String> = row.try_get("message_id").map_err(decode_error)?;
    let destination: String = row.try_get("destination").map_err(decode_error)?;
    let detail: Option<String> = row.try_get("detail").map_err(decode_error)?;
    let recorded_at: String = row.try_get("recorded_at").map_err(decode_error)?;

    Ok(FulfillmentRecord {
        asset_type: parse_asset_type(&asset_type)?,
        status: FulfillmentStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status}`")))?,
        message_id,
        destination,
        detail,
        recorded_at: parse_timestamp(&recorded_at)?,
    })
}

#[async_trait]
impl PendingFulfillmentStore for SqlPendingFulfillmentStore {
    async fn store_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        promise: &PendingPromise,
    ) -> Result<bool, StoreError> {
        Ok(self.insert_pending(tenant_id, lead_id, promise).await?)
    }

    async fn list_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<PendingPromise>, StoreError> {
        Ok(self.select_pending(tenant_id, lead_id).await?)
    }

    async fn mark_fulfilled(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        record: FulfillmentRecord,
    ) -> Result<(), StoreError> {
        Ok(self.append_record(tenant_id, lead_id, &record).await?)
    }

    async fn discard_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        asset_type: AssetType,
    ) -> Result<bool, StoreError> {
        Ok(self.delete_pending(tenant_id, lead_id, Some(asset_type)).await? > 0)
    }

    async fn clear_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<u64, StoreError> {
        Ok(self.delete_pending(tenant_id, lead_id, None).await?)
    }

    async fn history(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<FulfillmentRecord>, StoreError> {
        Ok(self.select_history(tenant_id, lead_id).await?)
    }
}
