use promissory_agent::ConversationContextResolver;
use promissory_core::domain::lead::{LeadId, TenantId};
use promissory_core::errors::{ApplicationError, StoreError};
use promissory_core::ports::{ConversationLog, PendingFulfillmentStore};
use promissory_db::connect_with_config;
use promissory_db::repositories::{SqlConversationLog, SqlPendingFulfillmentStore};
use serde_json::json;

use crate::commands::{
    asset_url_builder, build_runtime, load_config, CommandResult, EXIT_DATABASE,
};

enum ResolveFailure {
    Connect(String),
    Store(StoreError),
}

/// Shows what a fulfillment for this lead would link to, plus its pending
/// queue and delivery history.
pub fn run(tenant: &str, lead: &str) -> CommandResult {
    let config = match load_config("resolve") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let builder = match asset_url_builder("resolve", &config) {
        Ok(builder) => builder,
        Err(result) => return result,
    };
    let runtime = match build_runtime("resolve") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let tenant_id = TenantId(tenant.to_string());
    let lead_id = LeadId(lead.to_string());
    let resolver = ConversationContextResolver::new(builder, &config.catalog);

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ResolveFailure::Connect(error.to_string()))?;
        let conversations = SqlConversationLog::new(pool.clone());
        let pending_store = SqlPendingFulfillmentStore::new(pool.clone());

        let messages =
            conversations.messages(&tenant_id, &lead_id).await.map_err(ResolveFailure::Store)?;
        let pending =
            pending_store.list_pending(&tenant_id, &lead_id).await.map_err(ResolveFailure::Store)?;
        let history =
            pending_store.history(&tenant_id, &lead_id).await.map_err(ResolveFailure::Store)?;
        pool.close().await;
        Ok::<_, ResolveFailure>((messages, pending, history))
    });

    let (messages, pending, history) = match result {
        Ok(loaded) => loaded,
        Err(ResolveFailure::Connect(message)) => {
            return CommandResult::failure("resolve", "db_connectivity", message, EXIT_DATABASE);
        }
        Err(ResolveFailure::Store(error)) => {
            return CommandResult::from_application_error("resolve", &ApplicationError::from(error));
        }
    };

    let context = resolver.resolve_for_tenant(&messages, Some(&tenant_id));
    let message = match context.canonical_url.as_deref() {
        Some(url) => format!("resolved `{url}` from {} message(s)", messages.len()),
        None => format!("no location context in {} message(s)", messages.len()),
    };

    CommandResult::success_with_data(
        "resolve",
        message,
        Some(json!({
            "tenant_id": tenant_id.0,
            "lead_id": lead_id.0,
            "message_count": messages.len(),
            "context": context,
            "pending": pending,
            "history": history,
        })),
    )
}
