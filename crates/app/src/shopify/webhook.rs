//! Inbound webhook payloads and signature verification.
//!
//! Shopify signs each webhook body with an HMAC-SHA256 keyed by the app's
//! API secret and sends the base64 digest in `X-Shopify-Hmac-Sha256`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use howheard_core::{CustomerId, OrderId};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;

/// Header carrying the base64 body signature.
pub const HMAC_HEADER: &str = "X-Shopify-Hmac-Sha256";

/// Header naming the shop that sent the webhook.
pub const SHOP_DOMAIN_HEADER: &str = "X-Shopify-Shop-Domain";

/// Header naming the webhook topic.
pub const TOPIC_HEADER: &str = "X-Shopify-Topic";

/// Verify a webhook body against its `X-Shopify-Hmac-Sha256` header value.
#[must_use]
pub fn verify_body(body: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(provided) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

/// Sign a webhook body the way Shopify does (base64 digest).
#[must_use]
pub fn sign_body(body: &[u8], secret: &str) -> String {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// `orders/create` payload. Only the fields the app reads are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderCreated {
    pub id: OrderId,
    pub order_number: i64,
    pub created_at: DateTime<Utc>,
    /// Sales channel; `"web"` for online-store checkouts.
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub customer: Option<OrderCustomer>,
}

impl OrderCreated {
    /// Whether the order came through the online store checkout.
    #[must_use]
    pub fn is_web_checkout(&self) -> bool {
        self.source_name.as_deref() == Some("web")
    }
}

/// Customer block embedded in an order.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderCustomer {
    pub id: CustomerId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// Orders placed by the customer, including this one.
    #[serde(default)]
    pub orders_count: Option<i64>,
    #[serde(default)]
    pub total_spent: Option<Decimal>,
    #[serde(default)]
    pub default_address: Option<OrderAddress>,
}

impl OrderCustomer {
    /// Whether this order is the customer's first.
    #[must_use]
    pub fn is_first_order(&self) -> bool {
        self.orders_count == Some(1)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderAddress {
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub address2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
}

/// `app/uninstalled` payload (the shop resource).
#[derive(Debug, Clone, Deserialize)]
pub struct AppUninstalled {
    #[serde(default)]
    pub myshopify_domain: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ORDER: &str = r##"{
        "id": 450789469,
        "order_number": 1001,
        "name": "#1001",
        "created_at": "2024-03-13T16:09:54-04:00",
        "source_name": "web",
        "email": "bob@example.com",
        "total_price": "199.65",
        "customer": {
            "id": 207119551,
            "email": "bob@example.com",
            "first_name": "Bob",
            "last_name": "Norman",
            "orders_count": 1,
            "total_spent": "199.65",
            "default_address": {
                "address1": "Chestnut Street 92",
                "city": "Louisville",
                "province": "Kentucky",
                "country": "United States",
                "zip": "40202"
            }
        }
    }"##;

    #[test]
    fn test_order_created_deserializes() {
        let order: OrderCreated = serde_json::from_str(ORDER).unwrap();
        assert_eq!(order.id, OrderId::new(450_789_469));
        assert_eq!(order.order_number, 1001);
        assert!(order.is_web_checkout());

        let customer = order.customer.unwrap();
        assert!(customer.is_first_order());
        assert_eq!(customer.total_spent, Some(Decimal::new(19965, 2)));
        assert_eq!(
            customer.default_address.unwrap().city.as_deref(),
            Some("Louisville")
        );
    }

    #[test]
    fn test_guest_and_pos_orders() {
        let json = r#"{"id": 1, "order_number": 1002, "created_at": "2024-03-13T20:00:00Z",
                       "source_name": "pos", "customer": null}"#;
        let order: OrderCreated = serde_json::from_str(json).unwrap();
        assert!(!order.is_web_checkout());
        assert!(order.customer.is_none());
    }

    #[test]
    fn test_verify_body_round_trip() {
        let body = ORDER.as_bytes();
        let signature = sign_body(body, "hush");
        assert!(verify_body(body, &signature, "hush"));
        assert!(!verify_body(body, &signature, "other-secret"));
        assert!(!verify_body(b"{}", &signature, "hush"));
    }

    #[test]
    fn test_verify_body_rejects_non_base64() {
        assert!(!verify_body(b"{}", "***", "hush"));
        assert!(!verify_body(b"{}", "", "hush"));
    }
}
