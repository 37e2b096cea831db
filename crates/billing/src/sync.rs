//! Bulk resync from the Paddle API.
//!
//! Full paginated re-fetches per entity collection, used for backfill and
//! repair independent of webhook delivery. Every item flows through the same
//! reconciler as the webhook path; an individual item failure is tallied and
//! logged, never fatal to the run. The whole pass is sequential: one page in
//! flight, best effort, no transaction around the batch.

use crate::client::{BillingApi, Pages};
use crate::error::{ReconcileError, SyncError};
use crate::reconcile::Reconciler;
use crate::store::{AccountStore, EntityStore};

/// Tally for one sync run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub created: u32,
    pub updated: u32,
    pub errors: u32,
}

impl SyncOutcome {
    fn tally<R>(&mut self, entity: &str, id: &str, result: Result<(R, bool), ReconcileError>) {
        match result {
            Ok((_, true)) => self.created += 1,
            Ok((_, false)) => self.updated += 1,
            Err(error) => {
                tracing::warn!(entity, id, error = %error, "reconciliation failed, continuing sync");
                self.errors += 1;
            }
        }
    }

    fn merge(&mut self, other: SyncOutcome) {
        self.created += other.created;
        self.updated += other.updated;
        self.errors += other.errors;
    }
}

/// Per-entity tallies for a full resync.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncReport {
    pub products: SyncOutcome,
    pub prices: SyncOutcome,
    pub discounts: SyncOutcome,
    pub customers: SyncOutcome,
    pub addresses: SyncOutcome,
    pub businesses: SyncOutcome,
    pub subscriptions: SyncOutcome,
    pub transactions: SyncOutcome,
}

/// Drives paginated pulls through the shared reconciler.
pub struct SyncRunner<C, S, A> {
    api: C,
    reconciler: Reconciler<S, A>,
}

impl<C, S, A> SyncRunner<C, S, A>
where
    C: BillingApi,
    S: EntityStore,
    A: AccountStore,
{
    pub fn new(api: C, reconciler: Reconciler<S, A>) -> Self {
        Self { api, reconciler }
    }

    /// Everything, in foreign-key dependency order.
    pub async fn sync_all(&self) -> Result<SyncReport, SyncError> {
        let report = SyncReport {
            products: self.sync_products().await?,
            prices: self.sync_prices().await?,
            discounts: self.sync_discounts().await?,
            customers: self.sync_customers().await?,
            addresses: self.sync_addresses().await?,
            businesses: self.sync_businesses().await?,
            subscriptions: self.sync_subscriptions().await?,
            transactions: self.sync_transactions().await?,
        };
        tracing::info!(?report, "full paddle resync finished");
        Ok(report)
    }

    pub async fn sync_products(&self) -> Result<SyncOutcome, SyncError> {
        tracing::info!("syncing products from paddle");
        let mut outcome = SyncOutcome::default();
        let api = &self.api;
        let mut pages = Pages::new(|cursor| api.products_page(cursor));
        while let Some(batch) = pages.next_batch().await? {
            for payload in &batch {
                let result = self.reconciler.product(payload, None).await;
                outcome.tally("product", &payload.id, result);
            }
            tracing::debug!(?outcome, "product sync progress");
        }
        Ok(outcome)
    }

    pub async fn sync_prices(&self) -> Result<SyncOutcome, SyncError> {
        tracing::info!("syncing prices from paddle");
        let mut outcome = SyncOutcome::default();
        let api = &self.api;
        let mut pages = Pages::new(|cursor| api.prices_page(cursor));
        while let Some(batch) = pages.next_batch().await? {
            for payload in &batch {
                let result = self.reconciler.price(payload, None).await;
                outcome.tally("price", &payload.id, result);
            }
            tracing::debug!(?outcome, "price sync progress");
        }
        Ok(outcome)
    }

    pub async fn sync_discounts(&self) -> Result<SyncOutcome, SyncError> {
        tracing::info!("syncing discounts from paddle");
        let mut outcome = SyncOutcome::default();
        let api = &self.api;
        let mut pages = Pages::new(|cursor| api.discounts_page(cursor));
        while let Some(batch) = pages.next_batch().await? {
            for payload in &batch {
                let result = self.reconciler.discount(payload, None).await;
                outcome.tally("discount", &payload.id, result);
            }
            tracing::debug!(?outcome, "discount sync progress");
        }
        Ok(outcome)
    }

    pub async fn sync_customers(&self) -> Result<SyncOutcome, SyncError> {
        tracing::info!("syncing customers from paddle");
        let mut outcome = SyncOutcome::default();
        let api = &self.api;
        let mut pages = Pages::new(|cursor| api.customers_page(cursor));
        while let Some(batch) = pages.next_batch().await? {
            for payload in &batch {
                let result = self.reconciler.customer(payload, None).await;
                outcome.tally("customer", &payload.id, result);
            }
            tracing::debug!(?outcome, "customer sync progress");
        }
        Ok(outcome)
    }

    /// Addresses for every locally known customer. Deliberately
    /// O(customers x pages) external calls; this is a low-frequency
    /// maintenance job.
    pub async fn sync_addresses(&self) -> Result<SyncOutcome, SyncError> {
        tracing::info!("syncing addresses from paddle");
        let mut outcome = SyncOutcome::default();
        for customer_id in self.reconciler.store().customer_ids().await? {
            outcome.merge(self.sync_addresses_for_customer(&customer_id).await?);
        }
        Ok(outcome)
    }

    pub async fn sync_addresses_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<SyncOutcome, SyncError> {
        let mut outcome = SyncOutcome::default();
        let api = &self.api;
        let mut pages = Pages::new(|cursor| api.customer_addresses_page(customer_id, cursor));
        while let Some(batch) = pages.next_batch().await? {
            for payload in &batch {
                let result = self
                    .reconciler
                    .address(payload, Some(customer_id), None)
                    .await;
                outcome.tally("address", &payload.id, result);
            }
        }
        tracing::debug!(customer_id, ?outcome, "address sync for customer finished");
        Ok(outcome)
    }

    pub async fn sync_businesses(&self) -> Result<SyncOutcome, SyncError> {
        tracing::info!("syncing businesses from paddle");
        let mut outcome = SyncOutcome::default();
        for customer_id in self.reconciler.store().customer_ids().await? {
            outcome.merge(self.sync_businesses_for_customer(&customer_id).await?);
        }
        Ok(outcome)
    }

    pub async fn sync_businesses_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<SyncOutcome, SyncError> {
        let mut outcome = SyncOutcome::default();
        let api = &self.api;
        let mut pages = Pages::new(|cursor| api.customer_businesses_page(customer_id, cursor));
        while let Some(batch) = pages.next_batch().await? {
            for payload in &batch {
                let result = self
                    .reconciler
                    .business(payload, Some(customer_id), None)
                    .await;
                outcome.tally("business", &payload.id, result);
            }
        }
        tracing::debug!(customer_id, ?outcome, "business sync for customer finished");
        Ok(outcome)
    }

    pub async fn sync_subscriptions(&self) -> Result<SyncOutcome, SyncError> {
        tracing::info!("syncing subscriptions from paddle");
        let mut outcome = SyncOutcome::default();
        let api = &self.api;
        let mut pages = Pages::new(|cursor| api.subscriptions_page(None, cursor));
        while let Some(batch) = pages.next_batch().await? {
            for payload in &batch {
                let result = self.reconciler.subscription(payload, None).await;
                outcome.tally("subscription", &payload.id, result);
            }
            tracing::debug!(?outcome, "subscription sync progress");
        }
        Ok(outcome)
    }

    pub async fn sync_subscriptions_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<SyncOutcome, SyncError> {
        let mut outcome = SyncOutcome::default();
        let api = &self.api;
        let mut pages = Pages::new(|cursor| api.subscriptions_page(Some(customer_id), cursor));
        while let Some(batch) = pages.next_batch().await? {
            for payload in &batch {
                let result = self.reconciler.subscription(payload, None).await;
                outcome.tally("subscription", &payload.id, result);
            }
        }
        tracing::debug!(customer_id, ?outcome, "subscription sync for customer finished");
        Ok(outcome)
    }

    pub async fn sync_transactions(&self) -> Result<SyncOutcome, SyncError> {
        tracing::info!("syncing transactions from paddle");
        let mut outcome = SyncOutcome::default();
        let api = &self.api;
        let mut pages = Pages::new(|cursor| api.transactions_page(None, cursor));
        while let Some(batch) = pages.next_batch().await? {
            for payload in &batch {
                let result = self.reconciler.transaction(payload, None).await;
                outcome.tally("transaction", &payload.id, result);
            }
            tracing::debug!(?outcome, "transaction sync progress");
        }
        Ok(outcome)
    }

    /// The listing filter is advisory; items are re-checked against the
    /// requested subscription before being applied.
    pub async fn sync_transactions_for_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SyncOutcome, SyncError> {
        let mut outcome = SyncOutcome::default();
        let api = &self.api;
        let mut pages = Pages::new(|cursor| api.transactions_page(Some(subscription_id), cursor));
        while let Some(batch) = pages.next_batch().await? {
            for payload in &batch {
                if payload.subscription_id.as_deref() != Some(subscription_id) {
                    continue;
                }
                let result = self.reconciler.transaction(payload, None).await;
                outcome.tally("transaction", &payload.id, result);
            }
        }
        tracing::debug!(
            subscription_id,
            ?outcome,
            "transaction sync for subscription finished"
        );
        Ok(outcome)
    }
}
