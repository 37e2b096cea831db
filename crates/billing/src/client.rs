//! Paddle API configuration and REST client.
//!
//! The client is an explicitly constructed handle injected into the sync
//! runner; nothing in this crate reaches for ambient global state. It only
//! covers the list endpoints the bulk resync needs, and assumes transient
//! network retry is handled at the HTTP layer: every page fetch either
//! succeeds or surfaces an [`ApiError`].

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ApiError, ConfigError};
use crate::payloads::{
    AddressPayload, BusinessPayload, CustomerPayload, DiscountPayload, PricePayload,
    ProductPayload, SubscriptionPayload, TransactionPayload,
};

pub const LIVE_API_URL: &str = "https://api.paddle.com";
pub const SANDBOX_API_URL: &str = "https://sandbox-api.paddle.com";

/// Paddle's published webhook source addresses.
pub const LIVE_IPS: &[&str] = &[
    "34.232.58.13",
    "34.195.105.136",
    "34.237.3.244",
    "35.155.119.135",
    "52.11.166.252",
    "34.212.5.7",
];

pub const SANDBOX_IPS: &[&str] = &[
    "34.194.127.46",
    "54.234.237.108",
    "3.208.120.145",
    "44.226.236.210",
    "44.241.183.62",
    "100.20.172.113",
];

#[derive(Debug, Clone)]
pub struct PaddleConfig {
    pub api_url: String,
    pub api_token: String,
    pub webhook_secret: String,
    /// Selects the sandbox IP allow-list and default API base URL.
    pub sandbox: bool,
    pub live_ips: Vec<String>,
    pub sandbox_ips: Vec<String>,
    /// Table the subscription account references resolve against.
    pub account_table: String,
}

impl PaddleConfig {
    /// Load configuration from the environment (reads `.env` if present).
    ///
    /// `PADDLE_API_TOKEN` and `PADDLE_WEBHOOK_SECRET` are required;
    /// everything else has a default keyed off `PADDLE_SANDBOX`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let sandbox = std::env::var("PADDLE_SANDBOX")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let default_url = if sandbox { SANDBOX_API_URL } else { LIVE_API_URL };

        Ok(Self {
            api_url: std::env::var("PADDLE_API_URL").unwrap_or_else(|_| default_url.to_string()),
            api_token: std::env::var("PADDLE_API_TOKEN")
                .map_err(|_| ConfigError::Missing("PADDLE_API_TOKEN"))?,
            webhook_secret: std::env::var("PADDLE_WEBHOOK_SECRET")
                .map_err(|_| ConfigError::Missing("PADDLE_WEBHOOK_SECRET"))?,
            sandbox,
            live_ips: ip_list("PADDLE_ALLOWED_IPS", LIVE_IPS),
            sandbox_ips: ip_list("PADDLE_SANDBOX_ALLOWED_IPS", SANDBOX_IPS),
            account_table: std::env::var("PADDLE_ACCOUNT_TABLE")
                .unwrap_or_else(|_| "accounts".to_string()),
        })
    }

    /// The webhook source allow-list for the configured mode.
    pub fn allowed_ips(&self) -> &[String] {
        if self.sandbox {
            &self.sandbox_ips
        } else {
            &self.live_ips
        }
    }
}

fn ip_list(var: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(var) {
        Ok(value) => value.split(',').map(|s| s.trim().to_string()).collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

/// One page of results from a paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    /// Opaque cursor for the following page; `None` on the last page.
    pub next: Option<String>,
}

/// Lazy, restartable pull over a paginated listing. Owns the cursor state;
/// the caller just drains batches, so at most one page is in memory.
pub struct Pages<F> {
    fetch: F,
    cursor: Option<String>,
    done: bool,
}

impl<F> Pages<F> {
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            cursor: None,
            done: false,
        }
    }
}

impl<F, Fut, T> Pages<F>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
{
    /// Fetch the next batch, or `None` once the listing is exhausted.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<T>>, ApiError> {
        if self.done {
            return Ok(None);
        }
        let page = (self.fetch)(self.cursor.take()).await?;
        self.cursor = page.next;
        if self.cursor.is_none() {
            self.done = true;
        }
        Ok(Some(page.data))
    }
}

/// The slice of the Paddle REST API the bulk resync consumes. Injected into
/// [`crate::sync::SyncRunner`] so tests can substitute a stub.
pub trait BillingApi {
    async fn products_page(&self, cursor: Option<String>) -> Result<Page<ProductPayload>, ApiError>;
    async fn prices_page(&self, cursor: Option<String>) -> Result<Page<PricePayload>, ApiError>;
    async fn customers_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<CustomerPayload>, ApiError>;
    async fn discounts_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<DiscountPayload>, ApiError>;
    async fn subscriptions_page(
        &self,
        customer_id: Option<&str>,
        cursor: Option<String>,
    ) -> Result<Page<SubscriptionPayload>, ApiError>;
    async fn transactions_page(
        &self,
        subscription_id: Option<&str>,
        cursor: Option<String>,
    ) -> Result<Page<TransactionPayload>, ApiError>;
    async fn customer_addresses_page(
        &self,
        customer_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<AddressPayload>, ApiError>;
    async fn customer_businesses_page(
        &self,
        customer_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<BusinessPayload>, ApiError>;
}

/// Paddle list responses: `{ "data": [...], "meta": { "pagination": ... } }`.
#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    data: Vec<T>,
    #[serde(default)]
    meta: ListMeta,
}

#[derive(Debug, Default, Deserialize)]
struct ListMeta {
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Clone)]
pub struct PaddleClient {
    http: reqwest::Client,
    config: PaddleConfig,
}

impl PaddleClient {
    pub fn new(config: PaddleConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(PaddleConfig::from_env()?))
    }

    pub fn config(&self) -> &PaddleConfig {
        &self.config
    }

    /// The cursor is the full `meta.pagination.next` URL Paddle hands back,
    /// so follow-up pages are fetched verbatim.
    async fn fetch_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        cursor: Option<String>,
    ) -> Result<Page<T>, ApiError> {
        let request = match cursor {
            Some(url) => self.http.get(url),
            None => self
                .http
                .get(format!("{}{}", self.config.api_url, path))
                .query(query),
        };
        let response = request.bearer_auth(&self.config.api_token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let envelope: ListEnvelope<T> = response.json().await?;
        let next = match envelope.meta.pagination {
            Some(p) if p.has_more => p.next,
            _ => None,
        };
        Ok(Page {
            data: envelope.data,
            next,
        })
    }
}

impl BillingApi for PaddleClient {
    async fn products_page(&self, cursor: Option<String>) -> Result<Page<ProductPayload>, ApiError> {
        self.fetch_page("/products", &[], cursor).await
    }

    async fn prices_page(&self, cursor: Option<String>) -> Result<Page<PricePayload>, ApiError> {
        self.fetch_page("/prices", &[], cursor).await
    }

    async fn customers_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<CustomerPayload>, ApiError> {
        self.fetch_page("/customers", &[], cursor).await
    }

    async fn discounts_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<DiscountPayload>, ApiError> {
        self.fetch_page("/discounts", &[], cursor).await
    }

    async fn subscriptions_page(
        &self,
        customer_id: Option<&str>,
        cursor: Option<String>,
    ) -> Result<Page<SubscriptionPayload>, ApiError> {
        let query: Vec<(&str, &str)> = match customer_id {
            Some(id) => vec![("customer_id", id)],
            None => vec![],
        };
        self.fetch_page("/subscriptions", &query, cursor).await
    }

    async fn transactions_page(
        &self,
        subscription_id: Option<&str>,
        cursor: Option<String>,
    ) -> Result<Page<TransactionPayload>, ApiError> {
        let query: Vec<(&str, &str)> = match subscription_id {
            Some(id) => vec![("subscription_id", id)],
            None => vec![],
        };
        self.fetch_page("/transactions", &query, cursor).await
    }

    async fn customer_addresses_page(
        &self,
        customer_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<AddressPayload>, ApiError> {
        let path = format!("/customers/{customer_id}/addresses");
        self.fetch_page(&path, &[], cursor).await
    }

    async fn customer_businesses_page(
        &self,
        customer_id: &str,
        cursor: Option<String>,
    ) -> Result<Page<BusinessPayload>, ApiError> {
        let path = format!("/customers/{customer_id}/businesses");
        self.fetch_page(&path, &[], cursor).await
    }
}
