use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use promissory_core::config::AppConfig;
use promissory_core::domain::asset::AssetType;
use promissory_core::domain::fulfillment::{
    FulfillmentOutcome, FulfillmentRecord, FulfillmentStatus, GuardKey, OutboundMessage,
    SkipReason,
};
use promissory_core::domain::lead::{LeadId, TenantId};
use promissory_core::domain::signal::{PendingPromise, PromiseSignal};
use promissory_core::errors::DeliveryError;
use promissory_core::ports::{
    AssetConfigStore, ConversationLog, GuardStore, MessageSender, PendingFulfillmentStore,
};

use crate::context::ConversationContextResolver;
use crate::dedup::{DeliveryDeduplicator, GuardDecision};

pub const DEFAULT_RECIPIENT_NAME: &str = "there";

/// Substitutes `{name}` / `{url}` and enforces the channel length limit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageComposer {
    max_chars: usize,
    truncation_marker: String,
}

impl MessageComposer {
    pub fn new(max_chars: usize, truncation_marker: impl Into<String>) -> Self {
        Self { max_chars, truncation_marker: truncation_marker.into() }
    }

    pub fn compose(&self, template: &str, name: Option<&str>, url: &str) -> String {
        let name =
            name.map(str::trim).filter(|name| !name.is_empty()).unwrap_or(DEFAULT_RECIPIENT_NAME);
        let body = template.replace("{url}", url).replace("{name}", name);
        self.truncate(body)
    }

    /// Cuts on a char boundary so the result, marker included, is at most
    /// `max_chars` characters.
    pub fn truncate(&self, body: String) -> String {
        if body.chars().count() <= self.max_chars {
            return body;
        }
        let keep = self.max_chars.saturating_sub(self.truncation_marker.chars().count());
        let mut truncated = body.chars().take(keep).collect::<String>();
        truncated.push_str(&self.truncation_marker);
        truncated
    }
}

/// Collaborator stores the orchestrator is wired against.
#[derive(Clone)]
pub struct FulfillmentStores {
    pub conversations: Arc<dyn ConversationLog>,
    pub asset_configs: Arc<dyn AssetConfigStore>,
    pub pending: Arc<dyn PendingFulfillmentStore>,
    pub guards: Arc<dyn GuardStore>,
}

/// Turns a detected promise into exactly one outbound message, or into a
/// durable pending entry when the lead has no contact address yet.
///
/// Nothing escapes [`fulfill`](Self::fulfill): every failure is classified
/// into a [`FulfillmentOutcome`].
pub struct FulfillmentOrchestrator {
    conversations: Arc<dyn ConversationLog>,
    asset_configs: Arc<dyn AssetConfigStore>,
    pending: Arc<dyn PendingFulfillmentStore>,
    dedup: DeliveryDeduplicator,
    sender: Arc<dyn MessageSender>,
    resolver: ConversationContextResolver,
    composer: MessageComposer,
    send_timeout: Duration,
}

impl FulfillmentOrchestrator {
    pub fn new(
        stores: FulfillmentStores,
        sender: Arc<dyn MessageSender>,
        resolver: ConversationContextResolver,
        config: &AppConfig,
    ) -> Self {
        Self {
            conversations: stores.conversations,
            asset_configs: stores.asset_configs,
            pending: stores.pending,
            dedup: DeliveryDeduplicator::new(stores.guards, &config.dedup),
            sender,
            resolver,
            composer: MessageComposer::new(
                config.delivery.max_message_chars,
                config.delivery.truncation_marker.clone(),
            ),
            send_timeout: Duration::from_secs(config.delivery.timeout_secs),
        }
    }

    pub fn resolver(&self) -> &ConversationContextResolver {
        &self.resolver
    }

    pub async fn fulfill(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        promise: &PromiseSignal,
        destination: Option<&str>,
        name: Option<&str>,
    ) -> FulfillmentOutcome {
        let asset_type = promise.asset_type;
        let key = GuardKey::new(tenant_id, lead_id, asset_type);

        match self.dedup.check(&key).await {
            GuardDecision::Proceed => {}
            GuardDecision::Held => {
                return self.skipped(tenant_id, lead_id, asset_type, SkipReason::RecentlySent);
            }
            GuardDecision::Blocked => return guard_unavailable(asset_type),
        }

        let config = match self.asset_configs.load(tenant_id).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                return self.skipped(tenant_id, lead_id, asset_type, SkipReason::NotConfigured);
            }
            Err(store_error) => {
                error!(
                    event_name = "fulfillment.config.load_failed",
                    tenant_id = %tenant_id,
                    lead_id = %lead_id,
                    asset_type = asset_type.as_str(),
                    error = %store_error,
                    "asset configuration could not be loaded"
                );
                return FulfillmentOutcome::Failed {
                    asset_type,
                    detail: store_error.to_string(),
                    retryable: true,
                };
            }
        };
        let Some(settings) = config.asset(asset_type) else {
            return self.skipped(tenant_id, lead_id, asset_type, SkipReason::NotConfigured);
        };
        if !settings.enabled {
            return self.skipped(tenant_id, lead_id, asset_type, SkipReason::Disabled);
        }

        let messages = match self.conversations.messages(tenant_id, lead_id).await {
            Ok(messages) => messages,
            Err(store_error) => {
                warn!(
                    event_name = "fulfillment.context.history_unavailable",
                    tenant_id = %tenant_id,
                    lead_id = %lead_id,
                    error = %store_error,
                    "conversation history unavailable; using static asset url"
                );
                Vec::new()
            }
        };
        let context = self.resolver.resolve_for_tenant(&messages, Some(tenant_id));
        let url = context.canonical_url.as_deref().unwrap_or(settings.url.as_str());
        let body = self.composer.compose(&settings.message_template, name, url);

        let Some(destination) = destination.map(str::trim).filter(|value| !value.is_empty()) else {
            return self.defer(tenant_id, lead_id, promise).await;
        };

        match self.dedup.acquire(&key).await {
            GuardDecision::Proceed => {}
            GuardDecision::Held => {
                return self.skipped(tenant_id, lead_id, asset_type, SkipReason::RecentlySent);
            }
            GuardDecision::Blocked => return guard_unavailable(asset_type),
        }

        let message = OutboundMessage {
            to: destination.to_string(),
            from: config.sender_id().to_string(),
            body,
        };
        let send = tokio::time::timeout(self.send_timeout, self.sender.send(&message));
        let result = match send.await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Transient(format!(
                "send timed out after {}s",
                self.send_timeout.as_secs()
            ))),
        };

        match result {
            Ok(receipt) => {
                info!(
                    event_name = "fulfillment.sent",
                    tenant_id = %tenant_id,
                    lead_id = %lead_id,
                    asset_type = asset_type.as_str(),
                    message_id = receipt.message_id.as_deref().unwrap_or("<none>"),
                    "promised asset delivered"
                );
                self.record(
                    tenant_id,
                    lead_id,
                    FulfillmentRecord {
                        asset_type,
                        status: FulfillmentStatus::Sent,
                        message_id: receipt.message_id.clone(),
                        destination: message.to.clone(),
                        detail: Some(receipt.status),
                        recorded_at: Utc::now(),
                    },
                )
                .await;
                FulfillmentOutcome::Sent {
                    asset_type,
                    message_id: receipt.message_id,
                    destination: message.to,
                    body: message.body,
                }
            }
            Err(delivery_error) => {
                self.dedup.release(&key).await;
                let retryable = delivery_error.is_retryable();
                warn!(
                    event_name = "fulfillment.send_failed",
                    tenant_id = %tenant_id,
                    lead_id = %lead_id,
                    asset_type = asset_type.as_str(),
                    retryable,
                    error = %delivery_error,
                    "outbound send failed"
                );
                if !retryable {
                    self.record(
                        tenant_id,
                        lead_id,
                        FulfillmentRecord {
                            asset_type,
                            status: FulfillmentStatus::FailedFinal,
                            message_id: None,
                            destination: message.to,
                            detail: Some(delivery_error.to_string()),
                            recorded_at: Utc::now(),
                        },
                    )
                    .await;
                }
                let detail = delivery_error.to_string();
                FulfillmentOutcome::Failed { asset_type, detail, retryable }
            }
        }
    }

    /// Replays every pending promise of the lead now that a contact address
    /// is known. Skipped promises are terminal and leave the queue; transient
    /// failures stay queued.
    pub async fn fulfill_pending(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        destination: &str,
        name: Option<&str>,
    ) -> Vec<FulfillmentOutcome> {
        let pending = match self.pending.list_pending(tenant_id, lead_id).await {
            Ok(pending) => pending,
            Err(store_error) => {
                error!(
                    event_name = "fulfillment.replay.list_failed",
                    tenant_id = %tenant_id,
                    lead_id = %lead_id,
                    error = %store_error,
                    "pending promises could not be listed"
                );
                return Vec::new();
            }
        };

        let mut outcomes = Vec::with_capacity(pending.len());
        for entry in pending {
            let promise = PromiseSignal::from(entry);
            let outcome = self.fulfill(tenant_id, lead_id, &promise, Some(destination), name).await;
            if let FulfillmentOutcome::Skipped { asset_type, .. } = &outcome {
                if let Err(store_error) =
                    self.pending.discard_pending(tenant_id, lead_id, *asset_type).await
                {
                    error!(
                        event_name = "fulfillment.replay.discard_failed",
                        tenant_id = %tenant_id,
                        lead_id = %lead_id,
                        asset_type = asset_type.as_str(),
                        error = %store_error,
                        "skipped pending promise could not be discarded"
                    );
                }
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn defer(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        promise: &PromiseSignal,
    ) -> FulfillmentOutcome {
        let asset_type = promise.asset_type;
        match self.pending.store_pending(tenant_id, lead_id, &PendingPromise::from(promise)).await {
            Ok(newly_queued) => {
                info!(
                    event_name = "fulfillment.deferred",
                    tenant_id = %tenant_id,
                    lead_id = %lead_id,
                    asset_type = asset_type.as_str(),
                    newly_queued,
                    "no contact address yet; promise queued"
                );
                FulfillmentOutcome::Deferred { asset_type, newly_queued }
            }
            Err(store_error) => {
                error!(
                    event_name = "fulfillment.defer_failed",
                    tenant_id = %tenant_id,
                    lead_id = %lead_id,
                    asset_type = asset_type.as_str(),
                    error = %store_error,
                    "pending promise could not be stored"
                );
                let detail = store_error.to_string();
                FulfillmentOutcome::Failed { asset_type, detail, retryable: true }
            }
        }
    }

    async fn record(&self, tenant_id: &TenantId, lead_id: &LeadId, record: FulfillmentRecord) {
        let asset_type = record.asset_type;
        let status = record.status;
        if let Err(store_error) = self.pending.mark_fulfilled(tenant_id, lead_id, record).await {
            error!(
                event_name = "fulfillment.record_failed",
                tenant_id = %tenant_id,
                lead_id = %lead_id,
                asset_type = asset_type.as_str(),
                status = status.as_str(),
                error = %store_error,
                "fulfillment record could not be persisted"
            );
        }
    }

    fn skipped(
        &self,
        tenant_id: &TenantId,
        lead_id: &LeadId,
        asset_type: AssetType,
        reason: SkipReason,
    ) -> FulfillmentOutcome {
        info!(
            event_name = "fulfillment.skipped",
            tenant_id = %tenant_id,
            lead_id = %lead_id,
            asset_type = asset_type.as_str(),
            reason = reason.as_str(),
            "fulfillment skipped"
        );
        FulfillmentOutcome::Skipped { asset_type, reason }
    }
}

fn guard_unavailable(asset_type: AssetType) -> FulfillmentOutcome {
    FulfillmentOutcome::Failed {
        asset_type,
        detail: "guard store unavailable (fail_closed)".to_string(),
        retryable: true,
    }
}

#[cfg(test)]
mod tests {
    use super::MessageComposer;

    #[test]
    fn placeholders_are_substituted_with_default_name() {
        let composer = MessageComposer::new(320, "...");

        let body =
            composer.compose("Hi {name}! Register here: {url}", None, "https://x.example/?loc=A");

        assert_eq!(body, "Hi there! Register here: https://x.example/?loc=A");
        assert_eq!(composer.compose("Hi {name}", Some("  Ana "), ""), "Hi Ana");
    }

    #[test]
    fn long_messages_are_truncated_with_marker_within_limit() {
        let composer = MessageComposer::new(40, "...");
        let template = "Hi {name}, here is everything you asked about: {url}";

        let url = "https://register.example/enroll?loc=LAFCypress";

        let body = composer.compose(template, Some("Alexandra"), url);

        assert_eq!(body.chars().count(), 40);
        assert!(body.ends_with("..."));
    }

    #[test]
    fn truncation_respects_multibyte_characters() {
        let composer = MessageComposer::new(10, "…");

        let body = composer.truncate("ñandú ñandú ñandú".to_string());

        assert_eq!(body.chars().count(), 10);
        assert!(body.ends_with('…'));
        assert!(body.starts_with("ñandú ñan"));
    }

    #[test]
    fn short_messages_are_untouched() {
        let composer = MessageComposer::new(20, "...");

        assert_eq!(composer.truncate("hello".to_string()), "hello");
    }
}
