// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for Paddle Synchronization
//!
//! Tests critical boundary conditions across the full pipeline:
//! - Replay and ordering (PDL-R01 to PDL-R03)
//! - Referential gates (PDL-G01 to PDL-G02)
//! - Association replacement (PDL-A01)
//! - Batch resilience (PDL-B01)
//! - Security gates (PDL-S01)

use serde_json::json;
use time::macros::datetime;

use crate::client::{BillingApi, Page, PaddleConfig, SANDBOX_API_URL, SANDBOX_IPS};
use crate::error::{ApiError, DispatchError, ReconcileError};
use crate::payloads::{
    AddressPayload, BusinessPayload, CustomerPayload, DiscountPayload, PricePayload,
    ProductPayload, SubscriptionPayload, TransactionPayload,
};
use crate::reconcile::Reconciler;
use crate::store::memory::MemoryStore;
use crate::store::EntityStore;
use crate::sync::SyncRunner;
use crate::webhooks::{sign, WebhookHandler};

fn reconciler() -> (Reconciler<MemoryStore, MemoryStore>, MemoryStore) {
    let store = MemoryStore::new();
    (Reconciler::new(store.clone(), store.clone()), store)
}

fn subscription_payload(id: &str, account_id: serde_json::Value, products: &[&str]) -> SubscriptionPayload {
    let items: Vec<_> = products
        .iter()
        .map(|p| json!({ "price": { "product_id": p } }))
        .collect();
    serde_json::from_value(json!({
        "id": id,
        "status": "active",
        "customer_id": "ctm_01",
        "custom_data": { "account_id": account_id },
        "items": items
    }))
    .unwrap()
}

// =============================================================================
// PDL-R01: Same event applied twice - second pass is a clean update, not a
// duplicate or an error
// =============================================================================
#[tokio::test]
async fn replayed_event_is_idempotent() {
    let (reconciler, _store) = reconciler();
    let payload: ProductPayload =
        serde_json::from_value(json!({ "id": "pro_01", "name": "Starter", "status": "active" }))
            .unwrap();
    let at = Some(datetime!(2024-03-01 11:00 UTC));

    let (first, created) = reconciler.product(&payload, at).await.unwrap();
    assert!(created);
    let (second, created) = reconciler.product(&payload, at).await.unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);
    assert_eq!(first.name, second.name);
    assert_eq!(first.data, second.data);
}

// =============================================================================
// PDL-R02: Older event after newer one - dropped without error, newer state
// survives
// =============================================================================
#[tokio::test]
async fn stale_event_leaves_newer_state_untouched() {
    let (reconciler, store) = reconciler();
    let newer: ProductPayload =
        serde_json::from_value(json!({ "id": "pro_01", "name": "Renamed", "status": "active" }))
            .unwrap();
    let older: ProductPayload =
        serde_json::from_value(json!({ "id": "pro_01", "name": "Original", "status": "active" }))
            .unwrap();

    reconciler
        .product(&newer, Some(datetime!(2024-03-02 09:00 UTC)))
        .await
        .unwrap();
    let (_, created) = reconciler
        .product(&older, Some(datetime!(2024-03-01 09:00 UTC)))
        .await
        .unwrap();

    assert!(!created);
    let record = store.get_product("pro_01").await.unwrap().unwrap();
    assert_eq!(record.name, "Renamed");
    assert_eq!(record.occurred_at, Some(datetime!(2024-03-02 09:00 UTC)));
}

// =============================================================================
// PDL-R03: Event without a timestamp against a timestamped record - applied
// (absent timestamps never block)
// =============================================================================
#[tokio::test]
async fn untimestamped_event_is_always_applied() {
    let (reconciler, store) = reconciler();
    let first: ProductPayload =
        serde_json::from_value(json!({ "id": "pro_01", "name": "First", "status": "active" }))
            .unwrap();
    let second: ProductPayload =
        serde_json::from_value(json!({ "id": "pro_01", "name": "Second", "status": "active" }))
            .unwrap();

    reconciler
        .product(&first, Some(datetime!(2024-03-02 09:00 UTC)))
        .await
        .unwrap();
    reconciler.product(&second, None).await.unwrap();

    let record = store.get_product("pro_01").await.unwrap().unwrap();
    assert_eq!(record.name, "Second");
    // the recorded event time is kept from the last timestamped apply
    assert_eq!(record.occurred_at, Some(datetime!(2024-03-02 09:00 UTC)));
}

// =============================================================================
// PDL-G01: Subscription referencing an unknown local account - rejected
// before any write
// =============================================================================
#[tokio::test]
async fn unknown_account_reference_blocks_subscription() {
    let (reconciler, store) = reconciler();
    store.add_account(7, "owner@example.com");
    let payload = subscription_payload("sub_01", json!(999), &["pro_01"]);

    let err = reconciler.subscription(&payload, None).await.unwrap_err();
    assert!(matches!(err, ReconcileError::UnresolvedAccount(_)));
    assert_eq!(store.subscription_count(), 0);
    assert!(store.subscription_products("sub_01").is_empty());
}

// =============================================================================
// PDL-G02: Subscription carrying no account reference at all - accepted with
// a null link
// =============================================================================
#[tokio::test]
async fn subscription_without_account_reference_is_accepted() {
    let (reconciler, store) = reconciler();
    let payload: SubscriptionPayload = serde_json::from_value(json!({
        "id": "sub_01",
        "status": "active",
        "customer_id": "ctm_01",
        "items": []
    }))
    .unwrap();

    let (record, created) = reconciler.subscription(&payload, None).await.unwrap();
    assert!(created);
    assert_eq!(record.account_id, None);
    assert_eq!(store.subscription_count(), 1);
}

// =============================================================================
// PDL-A01: Product set {A,B} then {B,C} - association ends up exactly {B,C}
// =============================================================================
#[tokio::test]
async fn product_associations_are_replaced_wholesale() {
    let (reconciler, store) = reconciler();
    store.add_account(7, "owner@example.com");

    let first = subscription_payload("sub_01", json!(7), &["pro_a", "pro_b"]);
    reconciler.subscription(&first, None).await.unwrap();
    assert_eq!(store.subscription_products("sub_01"), vec!["pro_a", "pro_b"]);

    let second = subscription_payload("sub_01", json!(7), &["pro_c", "pro_b"]);
    reconciler.subscription(&second, None).await.unwrap();
    assert_eq!(store.subscription_products("sub_01"), vec!["pro_b", "pro_c"]);
}

// =============================================================================
// PDL-B01: Bulk page with one bad item - the rest of the page still lands,
// the failure is only tallied
// =============================================================================
struct OnePageApi {
    subscriptions: Vec<SubscriptionPayload>,
}

impl BillingApi for OnePageApi {
    async fn products_page(&self, _: Option<String>) -> Result<Page<ProductPayload>, ApiError> {
        Ok(Page { data: Vec::new(), next: None })
    }

    async fn prices_page(&self, _: Option<String>) -> Result<Page<PricePayload>, ApiError> {
        Ok(Page { data: Vec::new(), next: None })
    }

    async fn customers_page(&self, _: Option<String>) -> Result<Page<CustomerPayload>, ApiError> {
        Ok(Page { data: Vec::new(), next: None })
    }

    async fn discounts_page(&self, _: Option<String>) -> Result<Page<DiscountPayload>, ApiError> {
        Ok(Page { data: Vec::new(), next: None })
    }

    async fn subscriptions_page(
        &self,
        _: Option<&str>,
        _: Option<String>,
    ) -> Result<Page<SubscriptionPayload>, ApiError> {
        Ok(Page {
            data: self.subscriptions.clone(),
            next: None,
        })
    }

    async fn transactions_page(
        &self,
        _: Option<&str>,
        _: Option<String>,
    ) -> Result<Page<TransactionPayload>, ApiError> {
        Ok(Page { data: Vec::new(), next: None })
    }

    async fn customer_addresses_page(
        &self,
        _: &str,
        _: Option<String>,
    ) -> Result<Page<AddressPayload>, ApiError> {
        Ok(Page { data: Vec::new(), next: None })
    }

    async fn customer_businesses_page(
        &self,
        _: &str,
        _: Option<String>,
    ) -> Result<Page<BusinessPayload>, ApiError> {
        Ok(Page { data: Vec::new(), next: None })
    }
}

#[tokio::test]
async fn one_bad_item_does_not_abort_the_batch() {
    let store = MemoryStore::new();
    store.add_account(7, "owner@example.com");
    let api = OnePageApi {
        subscriptions: vec![
            subscription_payload("sub_ok_1", json!(7), &["pro_a"]),
            subscription_payload("sub_bad", json!("not-an-account"), &["pro_a"]),
            subscription_payload("sub_ok_2", json!(7), &["pro_b"]),
        ],
    };
    let runner = SyncRunner::new(api, Reconciler::new(store.clone(), store.clone()));

    let outcome = runner.sync_subscriptions().await.unwrap();
    assert_eq!(outcome.created, 2);
    assert_eq!(outcome.errors, 1);
    assert_eq!(store.subscription_count(), 2);
    assert!(store.get_subscription("sub_bad").await.unwrap().is_none());
}

// =============================================================================
// PDL-S01: Disallowed source with a bad signature - rejected on the IP gate
// first
// =============================================================================
#[tokio::test]
async fn ip_gate_fires_before_signature_gate() {
    let store = MemoryStore::new();
    let config = PaddleConfig {
        api_url: SANDBOX_API_URL.to_string(),
        api_token: "token".to_string(),
        webhook_secret: "secret".to_string(),
        sandbox: true,
        live_ips: Vec::new(),
        sandbox_ips: SANDBOX_IPS.iter().map(|s| s.to_string()).collect(),
        account_table: "accounts".to_string(),
    };
    let handler = WebhookHandler::new(&config, Reconciler::new(store.clone(), store));

    let body = serde_json::to_vec(&json!({
        "event_type": "product.created",
        "data": { "id": "pro_01", "name": "Starter", "status": "active" }
    }))
    .unwrap();

    let err = handler
        .handle(&body, "ts=0;h1=bogus", "203.0.113.9")
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::ForbiddenSource(_)));

    // same delivery from an allowed hop falls through to the signature gate
    let err = handler
        .handle(&body, "ts=0;h1=bogus", SANDBOX_IPS[0])
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidSignature));
}

// =============================================================================
// PDL-S02: End-to-end happy path through every gate
// =============================================================================
#[tokio::test]
async fn signed_delivery_from_allowed_ip_lands_in_store() {
    let store = MemoryStore::new();
    let config = PaddleConfig {
        api_url: SANDBOX_API_URL.to_string(),
        api_token: "token".to_string(),
        webhook_secret: "secret".to_string(),
        sandbox: true,
        live_ips: Vec::new(),
        sandbox_ips: SANDBOX_IPS.iter().map(|s| s.to_string()).collect(),
        account_table: "accounts".to_string(),
    };
    let handler = WebhookHandler::new(&config, Reconciler::new(store.clone(), store.clone()));

    let body = serde_json::to_vec(&json!({
        "event_id": "evt_01",
        "event_type": "customer.created",
        "occurred_at": "2024-03-01T11:00:00Z",
        "data": { "id": "ctm_01", "email": "owner@example.com" }
    }))
    .unwrap();

    handler
        .handle(&body, &sign(&body, "secret"), SANDBOX_IPS[0])
        .await
        .unwrap();
    let record = store.get_customer("ctm_01").await.unwrap().unwrap();
    assert_eq!(record.email, "owner@example.com");
    assert_eq!(record.occurred_at, Some(datetime!(2024-03-01 11:00 UTC)));
}
