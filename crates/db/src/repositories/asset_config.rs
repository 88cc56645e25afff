use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use promissory_core::domain::asset::{AssetSettings, AssetType, TenantAssetConfig};
use promissory_core::domain::lead::TenantId;
use promissory_core::errors::StoreError;
use promissory_core::ports::AssetConfigStore;

use super::{decode_error, RepositoryError};
use crate::DbPool;

pub struct SqlAssetConfigStore {
    pool: DbPool,
}

impl SqlAssetConfigStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find(&self, tenant_id: &TenantId) -> Result<Option<TenantAssetConfig>, RepositoryError> {
        let row = sqlx::query(
            "SELECT sender_id, assets_json FROM tenant_asset_config WHERE tenant_id = ?",
        )
        .bind(&tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let sender_id: String = row.try_get("sender_id").map_err(decode_error)?;
        let assets_json: String = row.try_get("assets_json").map_err(decode_error)?;
        let assets: BTreeMap<AssetType, AssetSettings> = serde_json::from_str(&assets_json)
            .map_err(|error| RepositoryError::Decode(format!("assets_json: {error}")))?;

        TenantAssetConfig::new(sender_id, assets)
            .map(Some)
            .map_err(|error| RepositoryError::Decode(error.to_string()))
    }

    async fn upsert(
        &self,
        tenant_id: &TenantId,
        config: &TenantAssetConfig,
    ) -> Result<(), RepositoryError> {
        let assets = config
            .assets()
            .map(|(asset_type, settings)| (*asset_type, settings.clone()))
            .collect::<BTreeMap<_, _>>();
        let assets_json = serde_json::to_string(&assets)
            .map_err(|error| RepositoryError::Decode(format!("assets_json: {error}")))?;

        sqlx::query(
            "INSERT INTO tenant_asset_config (tenant_id, sender_id, assets_json, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(tenant_id) DO UPDATE SET
                sender_id = excluded.sender_id,
                assets_json = excluded.assets_json,
                updated_at = excluded.updated_at",
        )
        .bind(&tenant_id.0)
        .bind(config.sender_id())
        .bind(assets_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AssetConfigStore for SqlAssetConfigStore {
    async fn load(&self, tenant_id: &TenantId) -> Result<Option<TenantAssetConfig>, StoreError> {
        Ok(self.find(tenant_id).await?)
    }

    async fn save(&self, tenant_id: &TenantId, config: TenantAssetConfig) -> Result<(), StoreError> {
        Ok(self.upsert(tenant_id, &config).await?)
    }
}
