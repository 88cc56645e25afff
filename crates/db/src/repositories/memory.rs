use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use promissory_core::domain::asset::{AssetType, TenantAssetConfig};
use promissory_core::domain::conversation::ConversationMessage;
use promissory_core::domain::fulfillment::{FulfillmentRecord, GuardKey};
use promissory_core::domain::lead::{LeadId, TenantId};
use promissory_core::domain::signal::PendingPromise;
use promissory_core::errors::StoreError;
use promissory_core::ports::{
    AssetConfigStore, ConversationLog, GuardStore, PendingFulfillmentStore,
};

type LeadKey = (String, String);

fn lead_key(tenant_id: &TenantId, lead_id: &LeadId) -> LeadKey {
    (tenant_id.0.clone(), lead_id.0.clone())
}

#[derive(Default)]
pub struct InMemoryConversationLog {
    messages: RwLock<HashMap<LeadKey, Vec<ConversationMessage>>>,
}

#[async_trait]
impl ConversationLog for InMemoryConversationLog {
    async fn messages(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        let messages = self.messages.read().await;
        Ok(messages.get(&lead_key(tenant_id, lead_id)).cloned().unwrap_or_default())
    }

    async fn append(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        message: ConversationMessage,
    ) -> Result<(), StoreError> {
        let mut messages = self.messages.write().await;
        messages.entry(lead_key(tenant_id, lead_id)).or_default().push(message);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAssetConfigStore {
    configs: RwLock<HashMap<String, TenantAssetConfig>>,
}

#[async_trait]
impl AssetConfigStore for InMemoryAssetConfigStore {
    async fn load(&self, tenant_id: &TenantId) -> Result<Option<TenantAssetConfig>, StoreError> {
        let configs = self.configs.read().await;
        Ok(configs.get(&tenant_id.0).cloned())
    }

    async fn save(&self, tenant_id: &TenantId, config: TenantAssetConfig) -> Result<(), StoreError> {
        let mut configs = self.configs.write().await;
        configs.insert(tenant_id.0.clone(), config);
        Ok(())
    }
}

#[derive(Default)]
struct LeadFulfillmentState {
    pending: Vec<PendingPromise>,
    history: Vec<FulfillmentRecord>,
}

/// Single lock around pending entries and history so `mark_fulfilled` is
/// atomic the same way the SQL transaction is.
#[derive(Default)]
pub struct InMemoryPendingFulfillmentStore {
    leads: Mutex<HashMap<LeadKey, LeadFulfillmentState>>,
}

#[async_trait]
impl PendingFulfillmentStore for InMemoryPendingFulfillmentStore {
    async fn store_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        promise: &PendingPromise,
    ) -> Result<bool, StoreError> {
        let mut leads = self.leads.lock().await;
        let state = leads.entry(lead_key(tenant_id, lead_id)).or_default();
        if state.pending.iter().any(|entry| entry.asset_type == promise.asset_type) {
            return Ok(false);
        }
        state.pending.push(promise.clone());
        Ok(true)
    }

    async fn list_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<PendingPromise>, StoreError> {
        let leads = self.leads.lock().await;
        let mut pending = leads
            .get(&lead_key(tenant_id, lead_id))
            .map(|state| state.pending.clone())
            .unwrap_or_default();
        pending.sort_by_key(|promise| promise.asset_type);
        Ok(pending)
    }

    async fn mark_fulfilled(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        record: FulfillmentRecord,
    ) -> Result<(), StoreError> {
        let mut leads = self.leads.lock().await;
        let state = leads.entry(lead_key(tenant_id, lead_id)).or_default();
        state.pending.retain(|entry| entry.asset_type != record.asset_type);
        state.history.push(record);
        Ok(())
    }

    async fn discard_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        asset_type: AssetType,
    ) -> Result<bool, StoreError> {
        let mut leads = self.leads.lock().await;
        let Some(state) = leads.get_mut(&lead_key(tenant_id, lead_id)) else {
            return Ok(false);
        };
        let before = state.pending.len();
        state.pending.retain(|entry| entry.asset_type != asset_type);
        Ok(state.pending.len() != before)
    }

    async fn clear_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<u64, StoreError> {
        let mut leads = self.leads.lock().await;
        let Some(state) = leads.get_mut(&lead_key(tenant_id, lead_id)) else {
            return Ok(0);
        };
        let removed = state.pending.len() as u64;
        state.pending.clear();
        Ok(removed)
    }

    async fn history(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
    ) -> Result<Vec<FulfillmentRecord>, StoreError> {
        let leads = self.leads.lock().await;
        Ok(leads
            .get(&lead_key(tenant_id, lead_id))
            .map(|state| state.history.clone())
            .unwrap_or_default())
    }
}

/// Expiry `None` means the ttl does not fit in an `Instant`; such a guard
/// only goes away through `release`.
#[derive(Default)]
pub struct InMemoryGuardStore {
    guards: Mutex<HashMap<String, Option<Instant>>>,
}

fn is_live(expires_at: Option<Instant>, now: Instant) -> bool {
    expires_at.map_or(true, |expires_at| expires_at > now)
}

#[async_trait]
impl GuardStore for InMemoryGuardStore {
    async fn set_if_absent(&self, key: &GuardKey, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut guards = self.guards.lock().await;
        if guards.get(key.as_str()).is_some_and(|expires_at| is_live(*expires_at, now)) {
            return Ok(false);
        }
        guards.insert(key.as_str().to_string(), now.checked_add(ttl));
        Ok(true)
    }

    async fn exists(&self, key: &GuardKey) -> Result<bool, StoreError> {
        let guards = self.guards.lock().await;
        Ok(guards.get(key.as_str()).is_some_and(|expires_at| is_live(*expires_at, Instant::now())))
    }

    async fn release(&self, key: &GuardKey) -> Result<(), StoreError> {
        let mut guards = self.guards.lock().await;
        guards.remove(key.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use promissory_core::domain::asset::AssetType;
    use promissory_core::domain::fulfillment::{FulfillmentRecord, FulfillmentStatus, GuardKey};
    use promissory_core::domain::lead::{LeadId, TenantId};
    use promissory_core::domain::signal::PendingPromise;
    use promissory_core::ports::{GuardStore, PendingFulfillmentStore};

    use crate::repositories::{InMemoryGuardStore, InMemoryPendingFulfillmentStore};

    fn pending(asset_type: AssetType) -> PendingPromise {
        PendingPromise {
            asset_type,
            confidence: 0.8,
            origin_text: "I'll text it to you".to_string(),
            detected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn pending_store_keeps_one_entry_per_asset_and_lists_in_asset_order() {
        let store = InMemoryPendingFulfillmentStore::default();
        let tenant = TenantId("t-1".to_string());
        let lead = LeadId("lead-1".to_string());

        assert!(store.store_pending(&tenant, &lead, &pending(AssetType::Info)).await.expect("store"));
        assert!(store
            .store_pending(&tenant, &lead, &pending(AssetType::RegistrationLink))
            .await
            .expect("store"));
        assert!(!store.store_pending(&tenant, &lead, &pending(AssetType::Info)).await.expect("dup"));

        let listed = store.list_pending(&tenant, &lead).await.expect("list");
        assert_eq!(
            listed.iter().map(|entry| entry.asset_type).collect::<Vec<_>>(),
            vec![AssetType::RegistrationLink, AssetType::Info]
        );
    }

    #[tokio::test]
    async fn mark_fulfilled_removes_pending_and_appends_history() {
        let store = InMemoryPendingFulfillmentStore::default();
        let tenant = TenantId("t-1".to_string());
        let lead = LeadId("lead-1".to_string());
        store.store_pending(&tenant, &lead, &pending(AssetType::Schedule)).await.expect("store");

        store
            .mark_fulfilled(
                &tenant,
                &lead,
                FulfillmentRecord {
                    asset_type: AssetType::Schedule,
                    status: FulfillmentStatus::Sent,
                    message_id: Some("SM1".to_string()),
                    destination: "+17135550199".to_string(),
                    detail: None,
                    recorded_at: Utc::now(),
                },
            )
            .await
            .expect("mark");

        assert!(store.list_pending(&tenant, &lead).await.expect("list").is_empty());
        assert_eq!(store.history(&tenant, &lead).await.expect("history").len(), 1);
        assert_eq!(store.clear_pending(&tenant, &lead).await.expect("clear"), 0);
    }

    #[tokio::test]
    async fn guard_store_honours_ttl_and_release() {
        let store = InMemoryGuardStore::default();
        let key =
            GuardKey::new(&TenantId("t".to_string()), &LeadId("l".to_string()), AssetType::Info);

        assert!(store.set_if_absent(&key, Duration::from_secs(60)).await.expect("acquire"));
        assert!(!store.set_if_absent(&key, Duration::from_secs(60)).await.expect("held"));
        store.release(&key).await.expect("release");
        assert!(store.set_if_absent(&key, Duration::ZERO).await.expect("reacquire"));
        assert!(!store.exists(&key).await.expect("expired"));
    }

    #[tokio::test]
    async fn oversized_ttl_holds_the_guard_until_release() {
        let store = InMemoryGuardStore::default();
        let key =
            GuardKey::new(&TenantId("t".to_string()), &LeadId("l".to_string()), AssetType::Pricing);

        assert!(store.set_if_absent(&key, Duration::MAX).await.expect("acquire"));
        assert!(store.exists(&key).await.expect("live"));
        assert!(!store.set_if_absent(&key, Duration::from_secs(1)).await.expect("held"));
        store.release(&key).await.expect("release");
        assert!(!store.exists(&key).await.expect("released"));
    }
}
