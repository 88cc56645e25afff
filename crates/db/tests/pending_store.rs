use chrono::Utc;

use promissory_core::domain::asset::AssetType;
use promissory_core::domain::fulfillment::{FulfillmentRecord, FulfillmentStatus};
use promissory_core::domain::lead::{LeadId, TenantId};
use promissory_core::domain::signal::PendingPromise;
use promissory_core::ports::PendingFulfillmentStore;
use promissory_db::repositories::SqlPendingFulfillmentStore;
use promissory_db::{connect_with_settings, migrations, DbPool};

async fn pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    pool
}

fn ids() -> (TenantId, LeadId) {
    (TenantId("tenant-houston".to_string()), LeadId("lead-42".to_string()))
}

fn pending(asset_type: AssetType, origin_text: &str) -> PendingPromise {
    PendingPromise {
        asset_type,
        confidence: 0.85,
        origin_text: origin_text.to_string(),
        detected_at: Utc::now(),
    }
}

fn record(asset_type: AssetType, status: FulfillmentStatus) -> FulfillmentRecord {
    FulfillmentRecord {
        asset_type,
        status,
        message_id: matches!(status, FulfillmentStatus::Sent).then(|| "SM123".to_string()),
        destination: "+17135550199".to_string(),
        detail: matches!(status, FulfillmentStatus::FailedFinal)
            .then(|| "invalid destination".to_string()),
        recorded_at: Utc::now(),
    }
}

#[tokio::test]
async fn deferred_promise_waits_until_a_destination_arrives() {
    let store = SqlPendingFulfillmentStore::new(pool().await);
    let (tenant, lead) = ids();

    let queued = store
        .store_pending(
            &tenant,
            &lead,
            &pending(AssetType::RegistrationLink, "I'll text you the registration link"),
        )
        .await
        .expect("store pending");
    assert!(queued);

    let listed = store.list_pending(&tenant, &lead).await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].asset_type, AssetType::RegistrationLink);
    assert_eq!(listed[0].origin_text, "I'll text you the registration link");
    assert!((listed[0].confidence - 0.85).abs() < f64::EPSILON);
}

#[tokio::test]
async fn second_store_for_same_asset_keeps_the_first_entry() {
    let store = SqlPendingFulfillmentStore::new(pool().await);
    let (tenant, lead) = ids();

    assert!(store
        .store_pending(&tenant, &lead, &pending(AssetType::Pricing, "first"))
        .await
        .expect("first"));
    assert!(!store
        .store_pending(&tenant, &lead, &pending(AssetType::Pricing, "second"))
        .await
        .expect("second"));

    let listed = store.list_pending(&tenant, &lead).await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].origin_text, "first");
}

#[tokio::test]
async fn pending_entries_list_in_asset_order() {
    let store = SqlPendingFulfillmentStore::new(pool().await);
    let (tenant, lead) = ids();

    for asset_type in [AssetType::Info, AssetType::RegistrationLink, AssetType::Schedule] {
        store.store_pending(&tenant, &lead, &pending(asset_type, "x")).await.expect("store");
    }

    let order = store
        .list_pending(&tenant, &lead)
        .await
        .expect("list")
        .into_iter()
        .map(|entry| entry.asset_type)
        .collect::<Vec<_>>();

    assert_eq!(order, vec![AssetType::RegistrationLink, AssetType::Schedule, AssetType::Info]);
}

#[tokio::test]
async fn mark_fulfilled_moves_entry_into_history() {
    let store = SqlPendingFulfillmentStore::new(pool().await);
    let (tenant, lead) = ids();
    store.store_pending(&tenant, &lead, &pending(AssetType::Schedule, "x")).await.expect("store");
    store.store_pending(&tenant, &lead, &pending(AssetType::Info, "y")).await.expect("store");

    store
        .mark_fulfilled(&tenant, &lead, record(AssetType::Schedule, FulfillmentStatus::Sent))
        .await
        .expect("mark sent");
    store
        .mark_fulfilled(&tenant, &lead, record(AssetType::Info, FulfillmentStatus::FailedFinal))
        .await
        .expect("mark failed");

    assert!(store.list_pending(&tenant, &lead).await.expect("list").is_empty());

    let history = store.history(&tenant, &lead).await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].asset_type, AssetType::Schedule);
    assert_eq!(history[0].status, FulfillmentStatus::Sent);
    assert_eq!(history[0].message_id.as_deref(), Some("SM123"));
    assert_eq!(history[1].status, FulfillmentStatus::FailedFinal);
    assert_eq!(history[1].detail.as_deref(), Some("invalid destination"));
}

#[tokio::test]
async fn discard_and_clear_report_what_they_removed() {
    let store = SqlPendingFulfillmentStore::new(pool().await);
    let (tenant, lead) = ids();
    for asset_type in [AssetType::Pricing, AssetType::Schedule, AssetType::Info] {
        store.store_pending(&tenant, &lead, &pending(asset_type, "x")).await.expect("store");
    }

    assert!(store.discard_pending(&tenant, &lead, AssetType::Pricing).await.expect("discard"));
    assert!(!store.discard_pending(&tenant, &lead, AssetType::Pricing).await.expect("again"));
    assert_eq!(store.clear_pending(&tenant, &lead).await.expect("clear"), 2);
    assert_eq!(store.clear_pending(&tenant, &lead).await.expect("clear again"), 0);
}

#[tokio::test]
async fn leads_do_not_see_each_others_entries() {
    let store = SqlPendingFulfillmentStore::new(pool().await);
    let (tenant, lead) = ids();
    let other = LeadId("lead-43".to_string());

    store.store_pending(&tenant, &lead, &pending(AssetType::Info, "x")).await.expect("store");

    assert!(store.list_pending(&tenant, &other).await.expect("list").is_empty());
    assert!(store.history(&tenant, &other).await.expect("history").is_empty());
}

#[tokio::test]
async fn history_rows_are_append_only() {
    let pool = pool().await;
    let store = SqlPendingFulfillmentStore::new(pool.clone());
    let (tenant, lead) = ids();
    store
        .mark_fulfilled(&tenant, &lead, record(AssetType::Info, FulfillmentStatus::Sent))
        .await
        .expect("mark sent");

    let rewrite = sqlx::query("UPDATE lead_fulfillment_record SET destination = 'x'")
        .execute(&pool)
        .await;

    assert!(rewrite.is_err());
    assert_eq!(store.history(&tenant, &lead).await.expect("history").len(), 1);
}
