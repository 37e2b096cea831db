//! Error types for the sync engine
//!
//! Reconciliation errors are returned as values so batch callers can tally
//! and continue; dispatcher gate errors abort the current request only.
//! Nothing in this crate retries: redelivery is the provider's job.

use thiserror::Error;

/// Failure while persisting or reading local records.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Failure of a single entity reconciliation.
///
/// These never cross the reconciler boundary as panics; orchestration code
/// counts them and moves on to the next item.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// `custom_data.account_id` was present but does not resolve against the
    /// local account store. The record is left untouched.
    #[error("account {0} does not exist")]
    UnresolvedAccount(String),

    #[error("payload could not be represented: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of one inbound webhook delivery.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("source ip {0} is not allow-listed")]
    ForbiddenSource(String),

    #[error("webhook signature verification failed")]
    InvalidSignature,

    #[error("malformed notification payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("reconciliation failed: {0}")]
    Reconciliation(#[from] ReconcileError),
}

impl DispatchError {
    /// Whether the transport layer should answer with a 4xx.
    /// Reconciliation failures are server-side and map to 5xx.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DispatchError::ForbiddenSource(_)
                | DispatchError::InvalidSignature
                | DispatchError::MalformedPayload(_)
        )
    }
}

/// Failure talking to the Paddle REST API. A failed page fetch aborts the
/// current sync run; transient retry is the HTTP client's concern.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("paddle api request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("paddle api returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Failure that aborts a bulk resync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Missing or invalid startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not configured")]
    Missing(&'static str),
}
