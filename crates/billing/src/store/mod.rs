//! Local record set for synced Paddle entities.
//!
//! Every entity keeps the full provider snapshot in `data`, integrator-owned
//! attributes in `custom_data`, and the timestamp of the event that last
//! touched it in `occurred_at` (None for records created by bulk pull before
//! any event arrived). `created_at`/`updated_at` are record lifecycle
//! timestamps. Ids are provider-assigned strings, never generated locally,
//! and there is no deletion path: provider-side deletion shows up as a
//! status value.

mod postgres;

#[cfg(test)]
pub(crate) mod memory;

pub use postgres::PgStore;

use serde_json::Value;
use time::OffsetDateTime;

use crate::error::StoreError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub status: String,
    pub data: Value,
    pub custom_data: Option<Value>,
    pub occurred_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Price {
    pub id: String,
    pub product_id: String,
    pub data: Value,
    pub custom_data: Option<Value>,
    pub occurred_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Customer {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    /// Local account linked by email at reconciliation time, when one exists.
    pub account_id: Option<i64>,
    pub data: Value,
    pub custom_data: Option<Value>,
    pub occurred_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Address {
    pub id: String,
    pub customer_id: Option<String>,
    pub country_code: String,
    pub data: Value,
    pub custom_data: Option<Value>,
    pub occurred_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Business {
    pub id: String,
    pub customer_id: Option<String>,
    pub data: Value,
    pub custom_data: Option<Value>,
    pub occurred_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Subscription {
    pub id: String,
    /// Local account resolved from `custom_data.account_id`.
    pub account_id: Option<i64>,
    pub customer_id: String,
    pub address_id: Option<String>,
    pub business_id: Option<String>,
    pub status: String,
    pub data: Value,
    pub custom_data: Option<Value>,
    pub occurred_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Transaction {
    pub id: String,
    pub customer_id: String,
    pub subscription_id: Option<String>,
    pub data: Value,
    pub custom_data: Option<Value>,
    pub occurred_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Discount {
    pub id: String,
    pub status: String,
    pub code: Option<String>,
    pub data: Value,
    pub custom_data: Option<Value>,
    pub occurred_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Product {
    pub fn new(id: &str, now: OffsetDateTime) -> Self {
        Self {
            id: id.to_string(),
            name: String::new(),
            status: String::new(),
            data: Value::Null,
            custom_data: None,
            occurred_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Price {
    pub fn new(id: &str, now: OffsetDateTime) -> Self {
        Self {
            id: id.to_string(),
            product_id: String::new(),
            data: Value::Null,
            custom_data: None,
            occurred_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Customer {
    pub fn new(id: &str, now: OffsetDateTime) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            email: String::new(),
            account_id: None,
            data: Value::Null,
            custom_data: None,
            occurred_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Address {
    pub fn new(id: &str, now: OffsetDateTime) -> Self {
        Self {
            id: id.to_string(),
            customer_id: None,
            country_code: String::new(),
            data: Value::Null,
            custom_data: None,
            occurred_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Business {
    pub fn new(id: &str, now: OffsetDateTime) -> Self {
        Self {
            id: id.to_string(),
            customer_id: None,
            data: Value::Null,
            custom_data: None,
            occurred_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Subscription {
    pub fn new(id: &str, now: OffsetDateTime) -> Self {
        Self {
            id: id.to_string(),
            account_id: None,
            customer_id: String::new(),
            address_id: None,
            business_id: None,
            status: String::new(),
            data: Value::Null,
            custom_data: None,
            occurred_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Transaction {
    pub fn new(id: &str, now: OffsetDateTime) -> Self {
        Self {
            id: id.to_string(),
            customer_id: String::new(),
            subscription_id: None,
            data: Value::Null,
            custom_data: None,
            occurred_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Discount {
    pub fn new(id: &str, now: OffsetDateTime) -> Self {
        Self {
            id: id.to_string(),
            status: String::new(),
            code: None,
            data: Value::Null,
            custom_data: None,
            occurred_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Keyed upsert storage for the synced entities.
///
/// `upsert_*` must be atomic per key (row upsert); the engine assumes no two
/// concurrent reconciliations for the same id interleave their
/// read-modify-write, but mandates no particular locking primitive.
pub trait EntityStore {
    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError>;
    async fn upsert_product(&self, record: &Product) -> Result<(), StoreError>;

    async fn get_price(&self, id: &str) -> Result<Option<Price>, StoreError>;
    async fn upsert_price(&self, record: &Price) -> Result<(), StoreError>;

    async fn get_customer(&self, id: &str) -> Result<Option<Customer>, StoreError>;
    async fn upsert_customer(&self, record: &Customer) -> Result<(), StoreError>;

    async fn get_address(&self, id: &str) -> Result<Option<Address>, StoreError>;
    async fn upsert_address(&self, record: &Address) -> Result<(), StoreError>;

    async fn get_business(&self, id: &str) -> Result<Option<Business>, StoreError>;
    async fn upsert_business(&self, record: &Business) -> Result<(), StoreError>;

    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>, StoreError>;
    async fn upsert_subscription(&self, record: &Subscription) -> Result<(), StoreError>;

    async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, StoreError>;
    async fn upsert_transaction(&self, record: &Transaction) -> Result<(), StoreError>;

    async fn get_discount(&self, id: &str) -> Result<Option<Discount>, StoreError>;
    async fn upsert_discount(&self, record: &Discount) -> Result<(), StoreError>;

    /// Replace the subscription's product membership wholesale. The set
    /// reflects the payload's current line items, not an accumulating log.
    async fn set_subscription_products(
        &self,
        subscription_id: &str,
        product_ids: &[String],
    ) -> Result<(), StoreError>;

    /// All local customer ids, for parent-scoped bulk syncs.
    async fn customer_ids(&self) -> Result<Vec<String>, StoreError>;
}

/// Resolution against the integrating application's own account table.
pub trait AccountStore {
    async fn exists(&self, account_id: i64) -> Result<bool, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<i64>, StoreError>;
}
