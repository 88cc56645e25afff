use chrono::{DateTime, Utc};
use thiserror::Error;

use promissory_core::domain::asset::AssetType;
use promissory_core::errors::StoreError;

pub mod asset_config;
pub mod conversation;
pub mod guard;
pub mod memory;
pub mod pending;

pub use asset_config::SqlAssetConfigStore;
pub use conversation::SqlConversationLog;
pub use guard::SqlGuardStore;
pub use memory::{
    InMemoryAssetConfigStore, InMemoryConversationLog, InMemoryGuardStore,
    InMemoryPendingFulfillmentStore,
};
pub use pending::SqlPendingFulfillmentStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(source) => StoreError::Unavailable(source.to_string()),
            RepositoryError::Decode(detail) => StoreError::Decode(detail),
        }
    }
}

pub(crate) fn decode_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{value}`: {error}")))
}

pub(crate) fn parse_asset_type(value: &str) -> Result<AssetType, RepositoryError> {
    AssetType::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown asset type `{value}`")))
}
