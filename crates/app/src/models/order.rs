//! Order record model.

use chrono::{DateTime, Utc};
use howheard_core::{AttributionStatus, CustomerId, OrderId, ShopDomain};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::shopify::webhook::{OrderCreated, OrderCustomer};

/// Customer details as they were when the order was placed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CustomerSnapshot {
    pub customer_id: Option<CustomerId>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub zip: Option<String>,
    pub orders_count: Option<i64>,
    pub total_spent: Option<Decimal>,
}

impl CustomerSnapshot {
    fn from_customer(customer: &OrderCustomer, order_email: Option<&String>) -> Self {
        let address = customer.default_address.clone().unwrap_or_default();
        Self {
            customer_id: Some(customer.id),
            email: customer.email.clone().or_else(|| order_email.cloned()),
            first_name: customer.first_name.clone(),
            last_name: customer.last_name.clone(),
            address1: address.address1,
            address2: address.address2,
            city: address.city,
            province: address.province,
            country: address.country,
            zip: address.zip,
            orders_count: customer.orders_count,
            total_spent: customer.total_spent,
        }
    }
}

/// An order as persisted on first receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderRecord {
    pub shop: ShopDomain,
    pub order_id: OrderId,
    pub order_number: i64,
    pub customer: CustomerSnapshot,
    pub ordered_at: DateTime<Utc>,
    pub attribution_status: AttributionStatus,
}

impl NewOrderRecord {
    /// Snapshot an `orders/create` payload.
    ///
    /// First orders from a known customer start `pending`; repeat customers
    /// and guest checkouts are `skipped`.
    #[must_use]
    pub fn from_webhook(shop: &ShopDomain, order: &OrderCreated) -> Self {
        let (customer, status) = match &order.customer {
            Some(c) => (
                CustomerSnapshot::from_customer(c, order.email.as_ref()),
                if c.is_first_order() {
                    AttributionStatus::Pending
                } else {
                    AttributionStatus::Skipped
                },
            ),
            None => (
                CustomerSnapshot {
                    email: order.email.clone(),
                    ..CustomerSnapshot::default()
                },
                AttributionStatus::Skipped,
            ),
        };

        Self {
            shop: shop.clone(),
            order_id: order.id,
            order_number: order.order_number,
            customer,
            ordered_at: order.created_at,
            attribution_status: status,
        }
    }
}

/// A stored order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRecord {
    pub shop: ShopDomain,
    pub order_id: OrderId,
    pub order_number: i64,
    pub customer: CustomerSnapshot,
    pub ordered_at: DateTime<Utc>,
    /// Label written back for this order's customer, once resolved.
    pub attribution: Option<String>,
    pub attribution_status: AttributionStatus,
    pub received_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Last failed reconciliation attempt.
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl OrderRecord {
    /// Materialize a record as stored at `received_at`.
    #[must_use]
    pub fn from_new(record: NewOrderRecord, received_at: DateTime<Utc>) -> Self {
        Self {
            shop: record.shop,
            order_id: record.order_id,
            order_number: record.order_number,
            customer: record.customer,
            ordered_at: record.ordered_at,
            attribution: None,
            attribution_status: record.attribution_status,
            received_at,
            resolved_at: None,
            last_attempt_at: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn order(json: &str) -> OrderCreated {
        serde_json::from_str(json).unwrap()
    }

    fn shop() -> ShopDomain {
        ShopDomain::parse("cool-store.myshopify.com").unwrap()
    }

    #[test]
    fn test_first_order_is_pending() {
        let order = order(
            r#"{"id": 1, "order_number": 1001, "created_at": "2024-03-13T20:00:00Z",
                "source_name": "web",
                "customer": {"id": 7, "email": "a@b.example", "orders_count": 1,
                             "total_spent": "10.00",
                             "default_address": {"city": "Louisville", "zip": "40202"}}}"#,
        );
        let record = NewOrderRecord::from_webhook(&shop(), &order);
        assert_eq!(record.attribution_status, AttributionStatus::Pending);
        assert_eq!(record.customer.customer_id, Some(CustomerId::new(7)));
        assert_eq!(record.customer.city.as_deref(), Some("Louisville"));
        assert_eq!(record.customer.total_spent, Some(Decimal::new(1000, 2)));
    }

    #[test]
    fn test_repeat_customer_is_skipped() {
        let order = order(
            r#"{"id": 2, "order_number": 1002, "created_at": "2024-03-13T20:00:00Z",
                "customer": {"id": 7, "orders_count": 3}}"#,
        );
        let record = NewOrderRecord::from_webhook(&shop(), &order);
        assert_eq!(record.attribution_status, AttributionStatus::Skipped);
    }

    #[test]
    fn test_guest_checkout_keeps_order_email() {
        let order = order(
            r#"{"id": 3, "order_number": 1003, "created_at": "2024-03-13T20:00:00Z",
                "email": "guest@b.example"}"#,
        );
        let record = NewOrderRecord::from_webhook(&shop(), &order);
        assert_eq!(record.attribution_status, AttributionStatus::Skipped);
        assert_eq!(record.customer.customer_id, None);
        assert_eq!(record.customer.email.as_deref(), Some("guest@b.example"));
    }
}
