use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use promissory_core::config::{DedupConfig, GuardFailureStrategy};
use promissory_core::domain::fulfillment::GuardKey;
use promissory_core::ports::GuardStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    /// No live guard (or the store is down and the strategy is fail-open).
    Proceed,
    /// A live guard exists for the key.
    Held,
    /// The store is down and the strategy is fail-closed.
    Blocked,
}

/// At-most-once guard keyed by `(tenant, lead, asset_type)`.
#[derive(Clone)]
pub struct DeliveryDeduplicator {
    store: Arc<dyn GuardStore>,
    ttl: Duration,
    strategy: GuardFailureStrategy,
}

impl DeliveryDeduplicator {
    pub fn new(store: Arc<dyn GuardStore>, config: &DedupConfig) -> Self {
        Self {
            store,
            ttl: Duration::from_secs(config.ttl_secs),
            strategy: config.failure_strategy,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn strategy(&self) -> GuardFailureStrategy {
        self.strategy
    }

    /// Read-only check used before any work is done for a promise.
    pub async fn check(&self, key: &GuardKey) -> GuardDecision {
        match self.store.exists(key).await {
            Ok(true) => GuardDecision::Held,
            Ok(false) => GuardDecision::Proceed,
            Err(store_error) => {
                error!(
                    event_name = "dedup.guard.check_failed",
                    guard_key = %key,
                    strategy = ?self.strategy,
                    error = %store_error,
                    "guard store unavailable during check"
                );
                self.on_store_failure()
            }
        }
    }

    /// Atomically claims the key for one send.
    pub async fn acquire(&self, key: &GuardKey) -> GuardDecision {
        match self.store.set_if_absent(key, self.ttl).await {
            Ok(true) => GuardDecision::Proceed,
            Ok(false) => GuardDecision::Held,
            Err(store_error) => {
                error!(
                    event_name = "dedup.guard.acquire_failed",
                    guard_key = %key,
                    strategy = ?self.strategy,
                    error = %store_error,
                    "guard store unavailable during acquire"
                );
                self.on_store_failure()
            }
        }
    }

    /// Gives the key back after a failed send so a later attempt may retry.
    pub async fn release(&self, key: &GuardKey) {
        if let Err(store_error) = self.store.release(key).await {
            warn!(
                event_name = "dedup.guard.release_failed",
                guard_key = %key,
                error = %store_error,
                "guard could not be released; key stays blocked until ttl expiry"
            );
        }
    }

    fn on_store_failure(&self) -> GuardDecision {
        match self.strategy {
            GuardFailureStrategy::FailOpen => GuardDecision::Proceed,
            GuardFailureStrategy::FailClosed => GuardDecision::Blocked,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use promissory_core::config::{DedupConfig, GuardFailureStrategy};
    use promissory_core::domain::asset::AssetType;
    use promissory_core::domain::fulfillment::GuardKey;
    use promissory_core::domain::lead::{LeadId, TenantId};
    use promissory_core::errors::StoreError;
    use promissory_core::ports::GuardStore;
    use promissory_db::repositories::InMemoryGuardStore;

    use super::{DeliveryDeduplicator, GuardDecision};

    struct UnavailableGuardStore;

    #[async_trait]
    impl GuardStore for UnavailableGuardStore {
        async fn set_if_absent(&self, _key: &GuardKey, _ttl: Duration) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn exists(&self, _key: &GuardKey) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn release(&self, _key: &GuardKey) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn key() -> GuardKey {
        GuardKey::new(&TenantId("t-1".to_string()), &LeadId("lead-1".to_string()), AssetType::Info)
    }

    fn config(strategy: GuardFailureStrategy) -> DedupConfig {
        DedupConfig { ttl_secs: 60, failure_strategy: strategy }
    }

    #[tokio::test]
    async fn second_acquire_within_ttl_is_held() {
        let dedup = DeliveryDeduplicator::new(
            Arc::new(InMemoryGuardStore::default()),
            &config(GuardFailureStrategy::FailOpen),
        );

        assert_eq!(dedup.check(&key()).await, GuardDecision::Proceed);
        assert_eq!(dedup.acquire(&key()).await, GuardDecision::Proceed);
        assert_eq!(dedup.acquire(&key()).await, GuardDecision::Held);
        assert_eq!(dedup.check(&key()).await, GuardDecision::Held);
    }

    #[tokio::test]
    async fn released_key_can_be_acquired_again() {
        let dedup = DeliveryDeduplicator::new(
            Arc::new(InMemoryGuardStore::default()),
            &config(GuardFailureStrategy::FailOpen),
        );

        assert_eq!(dedup.acquire(&key()).await, GuardDecision::Proceed);
        dedup.release(&key()).await;
        assert_eq!(dedup.acquire(&key()).await, GuardDecision::Proceed);
    }

    #[tokio::test]
    async fn store_outage_follows_failure_strategy() {
        let open =
            DeliveryDeduplicator::new(Arc::new(UnavailableGuardStore), &config(GuardFailureStrategy::FailOpen));
        let closed = DeliveryDeduplicator::new(
            Arc::new(UnavailableGuardStore),
            &config(GuardFailureStrategy::FailClosed),
        );

        assert_eq!(open.check(&key()).await, GuardDecision::Proceed);
        assert_eq!(open.acquire(&key()).await, GuardDecision::Proceed);
        assert_eq!(closed.check(&key()).await, GuardDecision::Blocked);
        assert_eq!(closed.acquire(&key()).await, GuardDecision::Blocked);
    }
}
