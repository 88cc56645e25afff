//! Collaborator interfaces the fulfillment engine is wired against.
//!
//! SQL and in-memory implementations live in `promissory-db`; the HTTP
//! sender lives in `promissory-agent`.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::asset::{AssetType, TenantAssetConfig};
use crate::domain::conversation::ConversationMessage;
use crate::domain::fulfillment::{DeliveryReceipt, FulfillmentRecord, GuardKey, OutboundMessage};
use crate::domain::lead::{LeadId, TenantId};
use crate::domain::signal::PendingPromise;
use crate::errors::{DeliveryError, StoreError};

/// Ordered dialogue history per `(tenant, lead)`.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    /// Oldest first.
    async fn messages(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<ConversationMessage>, StoreError>;

    async fn append(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        message: ConversationMessage,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AssetConfigStore: Send + Sync {
    async fn load(&self, tenant_id: &TenantId) -> Result<Option<TenantAssetConfig>, StoreError>;
    async fn save(&self, tenant_id: &TenantId, config: TenantAssetConfig) -> Result<(), StoreError>;
}

/// Durable queue of promises waiting for a contact address, plus the
/// append-only fulfillment history of each lead.
#[async_trait]
pub trait PendingFulfillmentStore: Send + Sync {
    /// Returns `false` without writing when the lead already has a pending
    /// entry for the same asset type.
    async fn store_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        promise: &PendingPromise,
    ) -> Result<bool, StoreError>;

    /// Pending entries ordered by asset type.
    async fn list_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<PendingPromise>, StoreError>;

    /// Removes the pending entry for `record.asset_type` (if any) and appends
    /// `record` to the history, atomically.
    async fn mark_fulfilled(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        record: FulfillmentRecord,
    ) -> Result<(), StoreError>;

    /// Drops a single pending entry without recording anything.
    async fn discard_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        asset_type: AssetType,
    ) -> Result<bool, StoreError>;

    /// Drops every pending entry for the lead. Returns how many were removed.
    async fn clear_pending(&self, tenant_id: &TenantId, lead_id: &LeadId)
        -> Result<u64, StoreError>;

    /// Oldest first.
    async fn history(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<FulfillmentRecord>, StoreError>;
}

/// TTL-bounded key store backing the delivery deduplicator.
#[async_trait]
pub trait GuardStore: Send + Sync {
    /// Sets `key` only when no live entry exists. Returns whether this call
    /// acquired it.
    async fn set_if_absent(&self, key: &GuardKey, ttl: Duration) -> Result<bool, StoreError>;
    async fn exists(&self, key: &GuardKey) -> Result<bool, StoreError>;
    async fn release(&self, key: &GuardKey) -> Result<(), StoreError>;
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DeliveryError>;
}
