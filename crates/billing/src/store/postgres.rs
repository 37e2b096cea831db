//! Postgres-backed entity store.
//!
//! Upserts are single `INSERT ... ON CONFLICT (id) DO UPDATE` statements so
//! concurrent reconciliations of the same id cannot duplicate rows.
//! `created_at` is written once on first insert and never touched again.

use sqlx::PgPool;

use super::{
    AccountStore, Address, Business, Customer, Discount, EntityStore, Price, Product,
    Subscription, Transaction,
};
use crate::error::StoreError;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    account_table: String,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            account_table: "accounts".to_string(),
        }
    }

    /// Point account resolution at the integrating application's table.
    /// The table needs `id BIGINT` and `email TEXT` columns.
    pub fn with_account_table(mut self, table: &str) -> Self {
        self.account_table = table.to_string();
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl EntityStore for PgStore {
    async fn get_product(&self, id: &str) -> Result<Option<Product>, StoreError> {
        let record = sqlx::query_as::<_, Product>(
            "SELECT id, name, status, data, custom_data, occurred_at, created_at, updated_at \
             FROM paddle_products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn upsert_product(&self, record: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO paddle_products
                (id, name, status, data, custom_data, occurred_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                status = EXCLUDED.status,
                data = EXCLUDED.data,
                custom_data = EXCLUDED.custom_data,
                occurred_at = EXCLUDED.occurred_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.status)
        .bind(&record.data)
        .bind(&record.custom_data)
        .bind(record.occurred_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_price(&self, id: &str) -> Result<Option<Price>, StoreError> {
        let record = sqlx::query_as::<_, Price>(
            "SELECT id, product_id, data, custom_data, occurred_at, created_at, updated_at \
             FROM paddle_prices WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn upsert_price(&self, record: &Price) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO paddle_prices
                (id, product_id, data, custom_data, occurred_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                product_id = EXCLUDED.product_id,
                data = EXCLUDED.data,
                custom_data = EXCLUDED.custom_data,
                occurred_at = EXCLUDED.occurred_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.product_id)
        .bind(&record.data)
        .bind(&record.custom_data)
        .bind(record.occurred_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_customer(&self, id: &str) -> Result<Option<Customer>, StoreError> {
        let record = sqlx::query_as::<_, Customer>(
            "SELECT id, name, email, account_id, data, custom_data, occurred_at, created_at, updated_at \
             FROM paddle_customers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn upsert_customer(&self, record: &Customer) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO paddle_customers
                (id, name, email, account_id, data, custom_data, occurred_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                email = EXCLUDED.email,
                account_id = EXCLUDED.account_id,
                data = EXCLUDED.data,
                custom_data = EXCLUDED.custom_data,
                occurred_at = EXCLUDED.occurred_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.email)
        .bind(record.account_id)
        .bind(&record.data)
        .bind(&record.custom_data)
        .bind(record.occurred_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_address(&self, id: &str) -> Result<Option<Address>, StoreError> {
        let record = sqlx::query_as::<_, Address>(
            "SELECT id, customer_id, country_code, data, custom_data, occurred_at, created_at, updated_at \
             FROM paddle_addresses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn upsert_address(&self, record: &Address) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO paddle_addresses
                (id, customer_id, country_code, data, custom_data, occurred_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                country_code = EXCLUDED.country_code,
                data = EXCLUDED.data,
                custom_data = EXCLUDED.custom_data,
                occurred_at = EXCLUDED.occurred_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.customer_id)
        .bind(&record.country_code)
        .bind(&record.data)
        .bind(&record.custom_data)
        .bind(record.occurred_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_business(&self, id: &str) -> Result<Option<Business>, StoreError> {
        let record = sqlx::query_as::<_, Business>(
            "SELECT id, customer_id, data, custom_data, occurred_at, created_at, updated_at \
             FROM paddle_businesses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn upsert_business(&self, record: &Business) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO paddle_businesses
                (id, customer_id, data, custom_data, occurred_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                data = EXCLUDED.data,
                custom_data = EXCLUDED.custom_data,
                occurred_at = EXCLUDED.occurred_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.customer_id)
        .bind(&record.data)
        .bind(&record.custom_data)
        .bind(record.occurred_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>, StoreError> {
        let record = sqlx::query_as::<_, Subscription>(
            "SELECT id, account_id, customer_id, address_id, business_id, status, data, custom_data, \
                    occurred_at, created_at, updated_at \
             FROM paddle_subscriptions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn upsert_subscription(&self, record: &Subscription) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO paddle_subscriptions
                (id, account_id, customer_id, address_id, business_id, status, data, custom_data,
                 occurred_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                account_id = EXCLUDED.account_id,
                customer_id = EXCLUDED.customer_id,
                address_id = EXCLUDED.address_id,
                business_id = EXCLUDED.business_id,
                status = EXCLUDED.status,
                data = EXCLUDED.data,
                custom_data = EXCLUDED.custom_data,
                occurred_at = EXCLUDED.occurred_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(record.account_id)
        .bind(&record.customer_id)
        .bind(&record.address_id)
        .bind(&record.business_id)
        .bind(&record.status)
        .bind(&record.data)
        .bind(&record.custom_data)
        .bind(record.occurred_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, StoreError> {
        let record = sqlx::query_as::<_, Transaction>(
            "SELECT id, customer_id, subscription_id, data, custom_data, occurred_at, created_at, updated_at \
             FROM paddle_transactions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn upsert_transaction(&self, record: &Transaction) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO paddle_transactions
                (id, customer_id, subscription_id, data, custom_data, occurred_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                subscription_id = EXCLUDED.subscription_id,
                data = EXCLUDED.data,
                custom_data = EXCLUDED.custom_data,
                occurred_at = EXCLUDED.occurred_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.customer_id)
        .bind(&record.subscription_id)
        .bind(&record.data)
        .bind(&record.custom_data)
        .bind(record.occurred_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_discount(&self, id: &str) -> Result<Option<Discount>, StoreError> {
        let record = sqlx::query_as::<_, Discount>(
            "SELECT id, status, code, data, custom_data, occurred_at, created_at, updated_at \
             FROM paddle_discounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn upsert_discount(&self, record: &Discount) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO paddle_discounts
                (id, status, code, data, custom_data, occurred_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                code = EXCLUDED.code,
                data = EXCLUDED.data,
                custom_data = EXCLUDED.custom_data,
                occurred_at = EXCLUDED.occurred_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.status)
        .bind(&record.code)
        .bind(&record.data)
        .bind(&record.custom_data)
        .bind(record.occurred_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_subscription_products(
        &self,
        subscription_id: &str,
        product_ids: &[String],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM paddle_subscription_products WHERE subscription_id = $1")
            .bind(subscription_id)
            .execute(&mut *tx)
            .await?;
        for product_id in product_ids {
            sqlx::query(
                "INSERT INTO paddle_subscription_products (subscription_id, product_id) \
                 VALUES ($1, $2)",
            )
            .bind(subscription_id)
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn customer_ids(&self) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM paddle_customers ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

impl AccountStore for PgStore {
    async fn exists(&self, account_id: i64) -> Result<bool, StoreError> {
        let sql = format!("SELECT id FROM {} WHERE id = $1", self.account_table);
        let row: Option<(i64,)> = sqlx::query_as(&sql)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<i64>, StoreError> {
        let sql = format!(
            "SELECT id FROM {} WHERE email = $1 LIMIT 1",
            self.account_table
        );
        let row: Option<(i64,)> = sqlx::query_as(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id,)| id))
    }
}
