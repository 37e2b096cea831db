//! Paddle payload types
//!
//! Typed views over the entity payloads Paddle sends in webhook notifications
//! and API list responses. Only the fields the reconcilers promote into
//! queryable columns are named; everything else is captured through
//! `#[serde(flatten)]` so serializing a payload back reproduces the full
//! provider snapshot for the record's `data` column.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// The webhook notification envelope: an event type tag, the moment the
/// change happened on Paddle's side, and an entity-specific payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationEnvelope {
    #[serde(default)]
    pub event_id: Option<String>,
    pub event_type: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub occurred_at: Option<OffsetDateTime>,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPayload {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePayload {
    pub id: String,
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerPayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressPayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub country_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessPayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionPayload {
    pub id: String,
    pub status: String,
    pub customer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
    #[serde(default)]
    pub items: Vec<SubscriptionItem>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl SubscriptionPayload {
    /// The product set this subscription currently covers, derived from its
    /// line items. Sorted and deduplicated: two items may share a product
    /// through different prices.
    pub fn product_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .items
            .iter()
            .map(|item| item.price.product_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionItem {
    pub price: SubscriptionItemPrice,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionItemPrice {
    pub product_id: String,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionPayload {
    pub id: String,
    pub customer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountPayload {
    pub id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn parses_notification_envelope() {
        let body = json!({
            "event_id": "evt_01h8bzakzx3hm2fmen703n5q45",
            "event_type": "product.updated",
            "occurred_at": "2024-03-01T11:00:00.123456Z",
            "notification_id": "ntf_01h8bzam1z32agrxjwhjgqk8w6",
            "data": { "id": "pro_01", "name": "Starter", "status": "active" }
        });
        let envelope: NotificationEnvelope = serde_json::from_value(body).unwrap();
        assert_eq!(envelope.event_type, "product.updated");
        assert_eq!(
            envelope.occurred_at.unwrap().replace_millisecond(0).unwrap(),
            datetime!(2024-03-01 11:00 UTC)
        );
        assert_eq!(envelope.data["id"], "pro_01");
    }

    #[test]
    fn envelope_without_event_type_is_rejected() {
        let body = json!({ "occurred_at": "2024-03-01T11:00:00Z", "data": {} });
        assert!(serde_json::from_value::<NotificationEnvelope>(body).is_err());
    }

    #[test]
    fn unknown_fields_survive_the_round_trip() {
        let raw = json!({
            "id": "pro_01",
            "name": "Starter",
            "status": "active",
            "tax_category": "standard",
            "image_url": "https://example.com/starter.png"
        });
        let payload: ProductPayload = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&payload).unwrap(), raw);
    }

    #[test]
    fn subscription_product_ids_are_deduplicated() {
        let payload: SubscriptionPayload = serde_json::from_value(json!({
            "id": "sub_01",
            "status": "active",
            "customer_id": "ctm_01",
            "items": [
                { "price": { "product_id": "pro_b" } },
                { "price": { "product_id": "pro_a" } },
                { "price": { "product_id": "pro_b" } }
            ]
        }))
        .unwrap();
        assert_eq!(payload.product_ids(), vec!["pro_a", "pro_b"]);
    }
}
