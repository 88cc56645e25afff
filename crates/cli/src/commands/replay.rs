use std::collections::BTreeMap;
use std::sync::Arc;

use promissory_agent::{
    ConversationContextResolver, FulfillmentOrchestrator, FulfillmentStores, HttpMessageSender,
};
use promissory_core::domain::lead::{LeadId, TenantId};
use promissory_core::errors::ApplicationError;
use promissory_db::connect_with_config;
use promissory_db::repositories::{
    SqlAssetConfigStore, SqlConversationLog, SqlGuardStore, SqlPendingFulfillmentStore,
};
use serde_json::json;
use tracing::{info, warn};

use crate::commands::{
    asset_url_builder, build_runtime, load_config, CommandResult, EXIT_DATABASE,
};

/// Delivers every pending promise of a lead to a now-known destination, then
/// deletes expired delivery guards.
pub fn run(tenant: &str, lead: &str, destination: &str, name: Option<&str>) -> CommandResult {
    let config = match load_config("replay") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let sender = match HttpMessageSender::from_config(&config.delivery) {
        Ok(Some(sender)) => sender,
        Ok(None) => {
            let error = ApplicationError::Configuration(
                "delivery.gateway_url and delivery.api_token must be set to replay".to_string(),
            );
            return CommandResult::from_application_error("replay", &error);
        }
        Err(error) => {
            let error = ApplicationError::Configuration(format!("http client: {error}"));
            return CommandResult::from_application_error("replay", &error);
        }
    };
    let builder = match asset_url_builder("replay", &config) {
        Ok(builder) => builder,
        Err(result) => return result,
    };
    let runtime = match build_runtime("replay") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let tenant_id = TenantId(tenant.to_string());
    let lead_id = LeadId(lead.to_string());

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database).await?;
        let guards = Arc::new(SqlGuardStore::new(pool.clone()));
        let stores = FulfillmentStores {
            conversations: Arc::new(SqlConversationLog::new(pool.clone())),
            asset_configs: Arc::new(SqlAssetConfigStore::new(pool.clone())),
            pending: Arc::new(SqlPendingFulfillmentStore::new(pool.clone())),
            guards: guards.clone(),
        };
        let resolver = ConversationContextResolver::new(builder, &config.catalog);
        let orchestrator =
            FulfillmentOrchestrator::new(stores, Arc::new(sender), resolver, &config);

        let outcomes = orchestrator.fulfill_pending(&tenant_id, &lead_id, destination, name).await;
        let purged = match guards.purge_expired().await {
            Ok(purged) => purged,
            Err(error) => {
                warn!(
                    event_name = "cli.replay.guard_purge_failed",
                    error = %error,
                    "expired delivery guards could not be purged"
                );
                0
            }
        };
        pool.close().await;
        Ok::<_, sqlx::Error>((outcomes, purged))
    });

    let (outcomes, purged) = match result {
        Ok(replayed) => replayed,
        Err(error) => {
            return CommandResult::failure(
                "replay",
                "db_connectivity",
                error.to_string(),
                EXIT_DATABASE,
            );
        }
    };

    let mut tally = BTreeMap::<&str, usize>::new();
    for outcome in &outcomes {
        *tally.entry(outcome.label()).or_default() += 1;
    }
    info!(
        event_name = "cli.replay.completed",
        tenant_id = %tenant_id,
        lead_id = %lead_id,
        replayed = outcomes.len(),
        purged_guards = purged,
        "pending promises replayed"
    );

    let summary = if outcomes.is_empty() {
        "no pending promises".to_string()
    } else {
        tally.iter().map(|(label, count)| format!("{count} {label}")).collect::<Vec<_>>().join(", ")
    };

    CommandResult::success_with_data(
        "replay",
        format!("replayed {} pending promise(s): {summary}", outcomes.len()),
        Some(json!({
            "tenant_id": tenant_id.0,
            "lead_id": lead_id.0,
            "destination": destination,
            "outcomes": outcomes,
            "purged_guards": purged,
        })),
    )
}
