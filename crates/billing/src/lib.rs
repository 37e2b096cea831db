// Billing crate clippy configuration
// These are intentional patterns in this crate:
#![allow(async_fn_in_trait)] // Store and API traits are consumed generically, not boxed
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Paddle Billing Integration
//!
//! Mirrors Paddle Billing state into local Postgres tables and keeps it
//! current from two directions that converge on the same reconciler:
//!
//! - **Webhooks**: signature-verified event ingestion with per-event upserts
//! - **Bulk resync**: full paginated re-fetch per entity collection
//!
//! Out-of-order webhook delivery is absorbed by a per-record timestamp guard,
//! so replaying or re-syncing is always safe.

pub mod client;
pub mod error;
pub mod ordering;
pub mod payloads;
pub mod reconcile;
pub mod store;
pub mod sync;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Client
pub use client::{
    BillingApi, PaddleClient, PaddleConfig, Page, Pages, LIVE_API_URL, LIVE_IPS, SANDBOX_API_URL,
    SANDBOX_IPS,
};

// Error
pub use error::{
    ApiError, ConfigError, DispatchError, ReconcileError, StoreError, SyncError,
};

// Payloads
pub use payloads::{
    AddressPayload, BusinessPayload, CustomerPayload, DiscountPayload, NotificationEnvelope,
    PricePayload, ProductPayload, SubscriptionItem, SubscriptionPayload, TransactionPayload,
};

// Reconcile
pub use reconcile::Reconciler;

// Store
pub use store::{
    AccountStore, Address, Business, Customer, Discount, EntityStore, PgStore, Price, Product,
    Subscription, Transaction,
};

// Sync
pub use sync::{SyncOutcome, SyncReport, SyncRunner};

// Webhooks
pub use webhooks::{Dispatched, EventKind, WebhookHandler};

use sqlx::PgPool;

/// Main billing service that combines webhook ingestion and bulk resync
pub struct BillingService {
    pub client: PaddleClient,
    pub webhooks: WebhookHandler<PgStore, PgStore>,
    pub sync: SyncRunner<PaddleClient, PgStore, PgStore>,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> Result<Self, ConfigError> {
        Ok(Self::new(PaddleClient::from_env()?, pool))
    }

    /// Create a new billing service with an explicit client
    pub fn new(client: PaddleClient, pool: PgPool) -> Self {
        let store = PgStore::new(pool).with_account_table(&client.config().account_table);
        let reconciler = Reconciler::new(store.clone(), store);

        Self {
            webhooks: WebhookHandler::new(client.config(), reconciler.clone()),
            sync: SyncRunner::new(client.clone(), reconciler),
            client,
        }
    }
}
