//! Per-entity reconciliation.
//!
//! Both ingestion paths (webhook dispatch and bulk resync) converge here.
//! Every entity follows the same shape: look up the record by provider id,
//! run the temporal ordering guard, map the payload onto the record, persist.
//! A stale event is a successful no-op, not a failure; real failures are
//! returned as values so batch callers can tally and continue.

use serde_json::Value;
use time::OffsetDateTime;

use crate::error::ReconcileError;
use crate::ordering;
use crate::payloads::{
    AddressPayload, BusinessPayload, CustomerPayload, DiscountPayload, PricePayload,
    ProductPayload, SubscriptionPayload, TransactionPayload,
};
use crate::store::{
    AccountStore, Address, Business, Customer, Discount, EntityStore, Price, Product,
    Subscription, Transaction,
};

/// Shared reconciliation engine over an entity store and the integrating
/// application's account store.
#[derive(Clone)]
pub struct Reconciler<S, A> {
    store: S,
    accounts: A,
}

impl<S: EntityStore, A: AccountStore> Reconciler<S, A> {
    pub fn new(store: S, accounts: A) -> Self {
        Self { store, accounts }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the reconciled record and whether it was newly created.
    pub async fn product(
        &self,
        payload: &ProductPayload,
        occurred_at: Option<OffsetDateTime>,
    ) -> Result<(Product, bool), ReconcileError> {
        let existing = self.store.get_product(&payload.id).await?;
        if let Some(existing) = &existing {
            if !ordering::accepts(existing.occurred_at, occurred_at) {
                tracing::debug!(id = %payload.id, "stale product event, keeping current record");
                return Ok((existing.clone(), false));
            }
        }
        let now = OffsetDateTime::now_utc();
        let created = existing.is_none();
        let mut record = existing.unwrap_or_else(|| Product::new(&payload.id, now));
        record.name = payload.name.clone();
        record.status = payload.status.clone();
        record.data = serde_json::to_value(payload)?;
        record.custom_data = payload.custom_data.clone();
        if occurred_at.is_some() {
            record.occurred_at = occurred_at;
        }
        record.updated_at = now;
        self.store.upsert_product(&record).await?;
        Ok((record, created))
    }

    pub async fn price(
        &self,
        payload: &PricePayload,
        occurred_at: Option<OffsetDateTime>,
    ) -> Result<(Price, bool), ReconcileError> {
        let existing = self.store.get_price(&payload.id).await?;
        if let Some(existing) = &existing {
            if !ordering::accepts(existing.occurred_at, occurred_at) {
                tracing::debug!(id = %payload.id, "stale price event, keeping current record");
                return Ok((existing.clone(), false));
            }
        }
        let now = OffsetDateTime::now_utc();
        let created = existing.is_none();
        let mut record = existing.unwrap_or_else(|| Price::new(&payload.id, now));
        record.product_id = payload.product_id.clone();
        record.data = serde_json::to_value(payload)?;
        record.custom_data = payload.custom_data.clone();
        if occurred_at.is_some() {
            record.occurred_at = occurred_at;
        }
        record.updated_at = now;
        self.store.upsert_price(&record).await?;
        Ok((record, created))
    }

    /// A local account with a matching email is linked opportunistically;
    /// an existing link is never cleared by a payload without a match.
    pub async fn customer(
        &self,
        payload: &CustomerPayload,
        occurred_at: Option<OffsetDateTime>,
    ) -> Result<(Customer, bool), ReconcileError> {
        let existing = self.store.get_customer(&payload.id).await?;
        if let Some(existing) = &existing {
            if !ordering::accepts(existing.occurred_at, occurred_at) {
                tracing::debug!(id = %payload.id, "stale customer event, keeping current record");
                return Ok((existing.clone(), false));
            }
        }
        let account_id = self.accounts.find_by_email(&payload.email).await?;
        let now = OffsetDateTime::now_utc();
        let created = existing.is_none();
        let mut record = existing.unwrap_or_else(|| Customer::new(&payload.id, now));
        record.name = payload.name.clone();
        record.email = payload.email.clone();
        if account_id.is_some() {
            record.account_id = account_id;
        }
        record.data = serde_json::to_value(payload)?;
        record.custom_data = payload.custom_data.clone();
        if occurred_at.is_some() {
            record.occurred_at = occurred_at;
        }
        record.updated_at = now;
        self.store.upsert_customer(&record).await?;
        Ok((record, created))
    }

    /// An explicit `customer_id` (parent-scoped bulk sync) wins; otherwise
    /// the payload's own customer reference is attached when present.
    pub async fn address(
        &self,
        payload: &AddressPayload,
        customer_id: Option<&str>,
        occurred_at: Option<OffsetDateTime>,
    ) -> Result<(Address, bool), ReconcileError> {
        let existing = self.store.get_address(&payload.id).await?;
        if let Some(existing) = &existing {
            if !ordering::accepts(existing.occurred_at, occurred_at) {
                tracing::debug!(id = %payload.id, "stale address event, keeping current record");
                return Ok((existing.clone(), false));
            }
        }
        let now = OffsetDateTime::now_utc();
        let created = existing.is_none();
        let mut record = existing.unwrap_or_else(|| Address::new(&payload.id, now));
        record.country_code = payload.country_code.clone();
        match customer_id {
            Some(id) => record.customer_id = Some(id.to_string()),
            None => {
                if let Some(id) = &payload.customer_id {
                    record.customer_id = Some(id.clone());
                }
            }
        }
        record.data = serde_json::to_value(payload)?;
        record.custom_data = payload.custom_data.clone();
        if occurred_at.is_some() {
            record.occurred_at = occurred_at;
        }
        record.updated_at = now;
        self.store.upsert_address(&record).await?;
        Ok((record, created))
    }

    pub async fn business(
        &self,
        payload: &BusinessPayload,
        customer_id: Option<&str>,
        occurred_at: Option<OffsetDateTime>,
    ) -> Result<(Business, bool), ReconcileError> {
        let existing = self.store.get_business(&payload.id).await?;
        if let Some(existing) = &existing {
            if !ordering::accepts(existing.occurred_at, occurred_at) {
                tracing::debug!(id = %payload.id, "stale business event, keeping current record");
                return Ok((existing.clone(), false));
            }
        }
        let now = OffsetDateTime::now_utc();
        let created = existing.is_none();
        let mut record = existing.unwrap_or_else(|| Business::new(&payload.id, now));
        match customer_id {
            Some(id) => record.customer_id = Some(id.to_string()),
            None => {
                if let Some(id) = &payload.customer_id {
                    record.customer_id = Some(id.clone());
                }
            }
        }
        record.data = serde_json::to_value(payload)?;
        record.custom_data = payload.custom_data.clone();
        if occurred_at.is_some() {
            record.occurred_at = occurred_at;
        }
        record.updated_at = now;
        self.store.upsert_business(&record).await?;
        Ok((record, created))
    }

    /// Precondition: an `account_id` present in `custom_data` must resolve
    /// against the account store before anything is written. The product
    /// membership is recomputed from the payload's line items and replaced
    /// wholesale together with the save.
    pub async fn subscription(
        &self,
        payload: &SubscriptionPayload,
        occurred_at: Option<OffsetDateTime>,
    ) -> Result<(Subscription, bool), ReconcileError> {
        let account_id = match account_ref(payload.custom_data.as_ref())? {
            Some(id) => {
                if !self.accounts.exists(id).await? {
                    return Err(ReconcileError::UnresolvedAccount(id.to_string()));
                }
                Some(id)
            }
            None => None,
        };

        let existing = self.store.get_subscription(&payload.id).await?;
        if let Some(existing) = &existing {
            if !ordering::accepts(existing.occurred_at, occurred_at) {
                tracing::debug!(id = %payload.id, "stale subscription event, keeping current record");
                return Ok((existing.clone(), false));
            }
        }
        let now = OffsetDateTime::now_utc();
        let created = existing.is_none();
        let mut record = existing.unwrap_or_else(|| Subscription::new(&payload.id, now));
        record.account_id = account_id;
        record.customer_id = payload.customer_id.clone();
        record.address_id = payload.address_id.clone();
        record.business_id = payload.business_id.clone();
        record.status = payload.status.clone();
        record.data = serde_json::to_value(payload)?;
        record.custom_data = payload.custom_data.clone();
        if occurred_at.is_some() {
            record.occurred_at = occurred_at;
        }
        record.updated_at = now;
        self.store.upsert_subscription(&record).await?;
        self.store
            .set_subscription_products(&record.id, &payload.product_ids())
            .await?;
        Ok((record, created))
    }

    pub async fn transaction(
        &self,
        payload: &TransactionPayload,
        occurred_at: Option<OffsetDateTime>,
    ) -> Result<(Transaction, bool), ReconcileError> {
        let existing = self.store.get_transaction(&payload.id).await?;
        if let Some(existing) = &existing {
            if !ordering::accepts(existing.occurred_at, occurred_at) {
                tracing::debug!(id = %payload.id, "stale transaction event, keeping current record");
                return Ok((existing.clone(), false));
            }
        }
        let now = OffsetDateTime::now_utc();
        let created = existing.is_none();
        let mut record = existing.unwrap_or_else(|| Transaction::new(&payload.id, now));
        record.customer_id = payload.customer_id.clone();
        record.subscription_id = payload.subscription_id.clone();
        record.data = serde_json::to_value(payload)?;
        record.custom_data = payload.custom_data.clone();
        if occurred_at.is_some() {
            record.occurred_at = occurred_at;
        }
        record.updated_at = now;
        self.store.upsert_transaction(&record).await?;
        Ok((record, created))
    }

    pub async fn discount(
        &self,
        payload: &DiscountPayload,
        occurred_at: Option<OffsetDateTime>,
    ) -> Result<(Discount, bool), ReconcileError> {
        let existing = self.store.get_discount(&payload.id).await?;
        if let Some(existing) = &existing {
            if !ordering::accepts(existing.occurred_at, occurred_at) {
                tracing::debug!(id = %payload.id, "stale discount event, keeping current record");
                return Ok((existing.clone(), false));
            }
        }
        let now = OffsetDateTime::now_utc();
        let created = existing.is_none();
        let mut record = existing.unwrap_or_else(|| Discount::new(&payload.id, now));
        record.status = payload.status.clone();
        record.code = payload.code.clone();
        record.data = serde_json::to_value(payload)?;
        record.custom_data = payload.custom_data.clone();
        if occurred_at.is_some() {
            record.occurred_at = occurred_at;
        }
        record.updated_at = now;
        self.store.upsert_discount(&record).await?;
        Ok((record, created))
    }
}

/// Pull the optional local-account reference out of `custom_data`.
/// Checkout flows embed it as either a JSON number or a numeric string;
/// anything else present-but-unparsable is an unresolved reference.
fn account_ref(custom_data: Option<&Value>) -> Result<Option<i64>, ReconcileError> {
    let Some(value) = custom_data.and_then(|data| data.get("account_id")) else {
        return Ok(None);
    };
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| ReconcileError::UnresolvedAccount(value.to_string())),
        Value::String(s) => s
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ReconcileError::UnresolvedAccount(s.clone())),
        other => Err(ReconcileError::UnresolvedAccount(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use serde_json::json;

    fn reconciler() -> (Reconciler<MemoryStore, MemoryStore>, MemoryStore) {
        let store = MemoryStore::new();
        (Reconciler::new(store.clone(), store.clone()), store)
    }

    fn customer_payload(email: &str) -> CustomerPayload {
        serde_json::from_value(json!({
            "id": "ctm_01",
            "name": "Ada",
            "email": email,
            "status": "active"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn customer_is_linked_to_account_by_email() {
        let (reconciler, store) = reconciler();
        store.add_account(7, "ada@example.com");

        let (record, created) = reconciler
            .customer(&customer_payload("ada@example.com"), None)
            .await
            .unwrap();
        assert!(created);
        assert_eq!(record.account_id, Some(7));
    }

    #[tokio::test]
    async fn customer_link_survives_update_without_match() {
        let (reconciler, store) = reconciler();
        store.add_account(7, "ada@example.com");
        reconciler
            .customer(&customer_payload("ada@example.com"), None)
            .await
            .unwrap();

        let (record, created) = reconciler
            .customer(&customer_payload("ada@newmail.example"), None)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(record.account_id, Some(7));
        assert_eq!(record.email, "ada@newmail.example");
    }

    #[tokio::test]
    async fn address_prefers_explicit_parent_over_payload() {
        let (reconciler, _store) = reconciler();
        let payload: AddressPayload = serde_json::from_value(json!({
            "id": "add_01",
            "customer_id": "ctm_payload",
            "country_code": "DE"
        }))
        .unwrap();

        let (record, _) = reconciler
            .address(&payload, Some("ctm_explicit"), None)
            .await
            .unwrap();
        assert_eq!(record.customer_id.as_deref(), Some("ctm_explicit"));

        let (record, _) = reconciler.address(&payload, None, None).await.unwrap();
        assert_eq!(record.customer_id.as_deref(), Some("ctm_payload"));
    }

    #[tokio::test]
    async fn subscription_without_account_reference_is_accepted() {
        let (reconciler, _store) = reconciler();
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
    }

    #[tokio::test]
    async fn subscription_accepts_numeric_string_account_reference() {
        let (reconciler, store) = reconciler();
        store.add_account(42, "owner@example.com");
        let payload: SubscriptionPayload = serde_json::from_value(json!({
            "id": "sub_01",
            "status": "active",
            "customer_id": "ctm_01",
            "custom_data": { "account_id": "42" },
            "items": []
        }))
        .unwrap();

        let (record, _) = reconciler.subscription(&payload, None).await.unwrap();
        assert_eq!(record.account_id, Some(42));
    }

    #[tokio::test]
    async fn garbage_account_reference_is_unresolved() {
        let (reconciler, _store) = reconciler();
        let payload: SubscriptionPayload = serde_json::from_value(json!({
            "id": "sub_01",
            "status": "active",
            "customer_id": "ctm_01",
            "custom_data": { "account_id": "not-a-number" },
            "items": []
        }))
        .unwrap();

        let err = reconciler.subscription(&payload, None).await.unwrap_err();
        assert!(matches!(err, ReconcileError::UnresolvedAccount(_)));
    }

    #[tokio::test]
    async fn snapshot_keeps_unpromoted_provider_fields() {
        let (reconciler, _store) = reconciler();
        let payload: ProductPayload = serde_json::from_value(json!({
            "id": "pro_01",
            "name": "Starter",
            "status": "active",
            "tax_category": "standard"
        }))
        .unwrap();

        let (record, _) = reconciler.product(&payload, None).await.unwrap();
        assert_eq!(record.data["tax_category"], "standard");
    }
}
