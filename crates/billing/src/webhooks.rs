//! Paddle webhook handling.
//!
//! One notification per invocation, synchronously to completion, through
//! hard gates that each fail closed: source IP allow-list, signature
//! verification, envelope parse, event-type lookup, reconciliation. There
//! are no retries here; Paddle redelivers on non-2xx.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::OffsetDateTime;

use crate::client::PaddleConfig;
use crate::error::DispatchError;
use crate::payloads::NotificationEnvelope;
use crate::reconcile::Reconciler;
use crate::store::{AccountStore, EntityStore};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of the `ts` component of a signature header. Bounds replay of
/// captured deliveries.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Which local entity an event type maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Product,
    Price,
    Customer,
    Address,
    Business,
    Subscription,
    Transaction,
    Discount,
}

/// Event types this engine reconciles. Anything absent from this table
/// (adjustment, payout and report alerts today, new types tomorrow) is
/// accepted with no action so Paddle can extend its catalogue without
/// breaking deliveries.
const SUPPORTED_EVENTS: &[(&str, EventKind)] = &[
    ("address.created", EventKind::Address),
    ("address.imported", EventKind::Address),
    ("address.updated", EventKind::Address),
    ("business.created", EventKind::Business),
    ("business.imported", EventKind::Business),
    ("business.updated", EventKind::Business),
    ("customer.created", EventKind::Customer),
    ("customer.imported", EventKind::Customer),
    ("customer.updated", EventKind::Customer),
    ("discount.created", EventKind::Discount),
    ("discount.imported", EventKind::Discount),
    ("discount.updated", EventKind::Discount),
    ("price.created", EventKind::Price),
    ("price.imported", EventKind::Price),
    ("price.updated", EventKind::Price),
    ("product.created", EventKind::Product),
    ("product.imported", EventKind::Product),
    ("product.updated", EventKind::Product),
    ("subscription.activated", EventKind::Subscription),
    ("subscription.canceled", EventKind::Subscription),
    ("subscription.created", EventKind::Subscription),
    ("subscription.imported", EventKind::Subscription),
    ("subscription.past_due", EventKind::Subscription),
    ("subscription.paused", EventKind::Subscription),
    ("subscription.resumed", EventKind::Subscription),
    ("subscription.trialing", EventKind::Subscription),
    ("subscription.updated", EventKind::Subscription),
    ("transaction.billed", EventKind::Transaction),
    ("transaction.cancelled", EventKind::Transaction),
    ("transaction.completed", EventKind::Transaction),
    ("transaction.created", EventKind::Transaction),
    ("transaction.paid", EventKind::Transaction),
    ("transaction.past_due", EventKind::Transaction),
    ("transaction.payment_failed", EventKind::Transaction),
    ("transaction.ready", EventKind::Transaction),
    ("transaction.updated", EventKind::Transaction),
];

impl EventKind {
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        SUPPORTED_EVENTS
            .iter()
            .find(|(tag, _)| *tag == event_type)
            .map(|(_, kind)| *kind)
    }
}

/// What a successfully handled delivery did.
#[derive(Debug)]
pub enum Dispatched {
    /// Event type outside the supported table; accepted, nothing written.
    Ignored,
    Applied {
        kind: EventKind,
        id: String,
        created: bool,
    },
}

/// Webhook handler for Paddle notifications.
pub struct WebhookHandler<S, A> {
    secret: String,
    sandbox: bool,
    live_ips: Vec<String>,
    sandbox_ips: Vec<String>,
    reconciler: Reconciler<S, A>,
}

impl<S: EntityStore, A: AccountStore> WebhookHandler<S, A> {
    pub fn new(config: &PaddleConfig, reconciler: Reconciler<S, A>) -> Self {
        Self {
            secret: config.webhook_secret.clone(),
            sandbox: config.sandbox,
            live_ips: config.live_ips.clone(),
            sandbox_ips: config.sandbox_ips.clone(),
            reconciler,
        }
    }

    /// Verify and apply one inbound notification.
    ///
    /// The transport layer maps the result to an HTTP status: 2xx on `Ok`,
    /// 4xx where [`DispatchError::is_client_error`], 5xx otherwise.
    pub async fn handle(
        &self,
        raw_body: &[u8],
        signature_header: &str,
        source_ip: &str,
    ) -> Result<Dispatched, DispatchError> {
        self.check_source_ip(source_ip)?;
        self.verify_signature(raw_body, signature_header)?;

        let envelope: NotificationEnvelope = serde_json::from_slice(raw_body)?;
        let occurred_at = envelope.occurred_at;

        let Some(kind) = EventKind::from_event_type(&envelope.event_type) else {
            tracing::info!(
                event_type = %envelope.event_type,
                "unhandled paddle event type, accepted with no action"
            );
            return Ok(Dispatched::Ignored);
        };

        let (id, created) = match kind {
            EventKind::Product => {
                let payload = serde_json::from_value(envelope.data)?;
                let (record, created) = self.reconciler.product(&payload, occurred_at).await?;
                (record.id, created)
            }
            EventKind::Price => {
                let payload = serde_json::from_value(envelope.data)?;
                let (record, created) = self.reconciler.price(&payload, occurred_at).await?;
                (record.id, created)
            }
            EventKind::Customer => {
                let payload = serde_json::from_value(envelope.data)?;
                let (record, created) = self.reconciler.customer(&payload, occurred_at).await?;
                (record.id, created)
            }
            EventKind::Address => {
                let payload = serde_json::from_value(envelope.data)?;
                let (record, created) =
                    self.reconciler.address(&payload, None, occurred_at).await?;
                (record.id, created)
            }
            EventKind::Business => {
                let payload = serde_json::from_value(envelope.data)?;
                let (record, created) =
                    self.reconciler.business(&payload, None, occurred_at).await?;
                (record.id, created)
            }
            EventKind::Subscription => {
                let payload = serde_json::from_value(envelope.data)?;
                let (record, created) =
                    self.reconciler.subscription(&payload, occurred_at).await?;
                (record.id, created)
            }
            EventKind::Transaction => {
                let payload = serde_json::from_value(envelope.data)?;
                let (record, created) =
                    self.reconciler.transaction(&payload, occurred_at).await?;
                (record.id, created)
            }
            EventKind::Discount => {
                let payload = serde_json::from_value(envelope.data)?;
                let (record, created) = self.reconciler.discount(&payload, occurred_at).await?;
                (record.id, created)
            }
        };

        tracing::info!(
            event_type = %envelope.event_type,
            id = %id,
            created,
            "applied paddle event"
        );
        Ok(Dispatched::Applied { kind, id, created })
    }

    /// Paddle deliveries may arrive through a proxy; the forwarded value's
    /// first hop is the one that must be allow-listed.
    fn check_source_ip(&self, source_ip: &str) -> Result<(), DispatchError> {
        let ip = source_ip.split(',').next().unwrap_or("").trim();
        let allowed = if self.sandbox {
            &self.sandbox_ips
        } else {
            &self.live_ips
        };
        if allowed.iter().any(|candidate| candidate == ip) {
            Ok(())
        } else {
            Err(DispatchError::ForbiddenSource(ip.to_string()))
        }
    }

    /// Paddle signs `"{ts}:{raw_body}"` with HMAC-SHA256 and sends
    /// `Paddle-Signature: ts=...;h1=...`. Multiple `h1` values may be present
    /// during secret rotation; any match passes.
    fn verify_signature(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<(), DispatchError> {
        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<&str> = Vec::new();
        for part in signature_header.split(';') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "ts" => timestamp = value.parse().ok(),
                "h1" => signatures.push(value),
                _ => {}
            }
        }

        let Some(timestamp) = timestamp else {
            tracing::warn!("signature header has no usable ts component");
            return Err(DispatchError::InvalidSignature);
        };
        if signatures.is_empty() {
            tracing::warn!("signature header has no h1 component");
            return Err(DispatchError::InvalidSignature);
        }

        let now = OffsetDateTime::now_utc().unix_timestamp();
        if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            tracing::warn!(
                timestamp,
                now,
                "signature timestamp outside tolerance window"
            );
            return Err(DispatchError::InvalidSignature);
        }

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| DispatchError::InvalidSignature)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b":");
        mac.update(raw_body);
        let computed = hex::encode(mac.finalize().into_bytes());

        if signatures.iter().any(|candidate| *candidate == computed) {
            Ok(())
        } else {
            Err(DispatchError::InvalidSignature)
        }
    }
}

#[cfg(test)]
pub(crate) fn sign(raw_body: &[u8], secret: &str) -> String {
    let ts = OffsetDateTime::now_utc().unix_timestamp();
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(ts.to_string().as_bytes());
    mac.update(b":");
    mac.update(raw_body);
    format!("ts={ts};h1={}", hex::encode(mac.finalize().into_bytes()))
}
