//! In-memory entity/account store for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{
    AccountStore, Address, Business, Customer, Discount, EntityStore, Price, Product,
    Subscription, Transaction,
};
use crate::error::StoreError;

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    products: HashMap<String, Product>,
    prices: HashMap<String, Price>,
    customers: HashMap<String, Customer>,
    addresses: HashMap<String, Address>,
    businesses: HashMap<String, Business>,
    subscriptions: HashMap<String, Subscription>,
    transactions: HashMap<String, Transaction>,
    discounts: HashMap<String, Discount>,
    subscription_products: HashMap<String, Vec<String>>,
    accounts: HashMap<i64, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&self, id: i64, email: &str) {
        self.inner
            .lock()
            .unwrap()
            .accounts
            .insert(id, email.to_string());
    }

    pub fn subscription_products(&self, subscription_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .subscription_products
            .get(subscription_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.lock().unwrap().subscriptions.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.inner.lock().unwrap().transactions.len()
    }
}

impl EntityStore for MemoryStore {
    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.inner.lock().unwrap().products.get(id).cloned())
    }

    async fn upsert_product(&self, record: &Product) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .products
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_price(&self, id: &str) -> Result<Option<Price>, StoreError> {
        Ok(self.inner.lock().unwrap().prices.get(id).cloned())
    }

    async fn upsert_price(&self, record: &Price) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .prices
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_customer(&self, id: &str) -> Result<Option<Customer>, StoreError> {
        Ok(self.inner.lock().unwrap().customers.get(id).cloned())
    }

    async fn upsert_customer(&self, record: &Customer) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .customers
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_address(&self, id: &str) -> Result<Option<Address>, StoreError> {
        Ok(self.inner.lock().unwrap().addresses.get(id).cloned())
    }

    async fn upsert_address(&self, record: &Address) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .addresses
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_business(&self, id: &str) -> Result<Option<Business>, StoreError> {
        Ok(self.inner.lock().unwrap().businesses.get(id).cloned())
    }

    async fn upsert_business(&self, record: &Business) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .businesses
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>, StoreError> {
        Ok(self.inner.lock().unwrap().subscriptions.get(id).cloned())
    }

    async fn upsert_subscription(&self, record: &Subscription) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, StoreError> {
        Ok(self.inner.lock().unwrap().transactions.get(id).cloned())
    }

    async fn upsert_transaction(&self, record: &Transaction) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .transactions
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_discount(&self, id: &str) -> Result<Option<Discount>, StoreError> {
        Ok(self.inner.lock().unwrap().discounts.get(id).cloned())
    }

    async fn upsert_discount(&self, record: &Discount) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .discounts
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn set_subscription_products(
        &self,
        subscription_id: &str,
        product_ids: &[String],
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .subscription_products
            .insert(subscription_id.to_string(), product_ids.to_vec());
        Ok(())
    }

    async fn customer_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.inner.lock().unwrap().customers.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

impl AccountStore for MemoryStore {
    async fn exists(&self, account_id: i64) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().accounts.contains_key(&account_id))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|(_, e)| e.as_str() == email)
            .map(|(id, _)| *id))
    }
}
