//! Request and response shapes for the Shopify REST Admin API.

use chrono::{DateTime, NaiveDate, Utc};
use howheard_core::{ChargeId, CustomerId, MetafieldId, ShopId, WebhookId};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Metafield namespace the app writes attribution labels under.
pub const METAFIELD_NAMESPACE: &str = "howheard";

/// Metafield key holding the attribution label.
pub const METAFIELD_KEY: &str = "source";

/// Offline access token returned by the OAuth code exchange.
#[derive(Clone)]
pub struct AccessToken {
    pub token: SecretString,
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Shop profile (`GET /shop.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct ShopProfile {
    pub id: ShopId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub myshopify_domain: Option<String>,
    #[serde(default)]
    pub iana_timezone: Option<String>,
    #[serde(default)]
    pub primary_locale: Option<String>,
    #[serde(default)]
    pub plan_name: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Webhook topics the app subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookTopic {
    OrdersCreate,
    AppUninstalled,
}

impl WebhookTopic {
    /// Topic name as Shopify spells it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrdersCreate => "orders/create",
            Self::AppUninstalled => "app/uninstalled",
        }
    }
}

impl std::fmt::Display for WebhookTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A webhook subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct Webhook {
    pub id: WebhookId,
    pub topic: String,
    pub address: String,
}

/// Body for creating a recurring application charge.
#[derive(Debug, Clone, Serialize)]
pub struct RecurringChargeRequest {
    pub name: String,
    pub price: Decimal,
    pub return_url: String,
    pub trial_days: u32,
    /// `Some(true)` for test charges; omitted for real ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<bool>,
}

/// Status of a recurring charge on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeStatus {
    Pending,
    Accepted,
    Active,
    Declined,
    Expired,
    Frozen,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Active => "active",
            Self::Declined => "declined",
            Self::Expired => "expired",
            Self::Frozen => "frozen",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A recurring application charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringCharge {
    pub id: ChargeId,
    pub name: String,
    pub price: Decimal,
    pub status: ChargeStatus,
    #[serde(default)]
    pub test: Option<bool>,
    #[serde(default)]
    pub trial_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_ends_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_url: Option<String>,
}

impl RecurringCharge {
    /// Whether the platform flagged this as a test charge.
    #[must_use]
    pub fn is_test(&self) -> bool {
        self.test.unwrap_or(false)
    }
}

/// A customer as returned by the customer search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerSummary {
    pub id: CustomerId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub orders_count: Option<i64>,
}

/// Body for creating a metafield.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetafieldInput {
    pub namespace: String,
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub value_type: String,
}

impl MetafieldInput {
    /// The attribution label metafield written on a customer.
    #[must_use]
    pub fn attribution(label: &str) -> Self {
        Self {
            namespace: METAFIELD_NAMESPACE.to_string(),
            key: METAFIELD_KEY.to_string(),
            value: label.to_string(),
            value_type: "single_line_text_field".to_string(),
        }
    }
}

/// A created metafield.
#[derive(Debug, Clone, Deserialize)]
pub struct Metafield {
    pub id: MetafieldId,
    pub namespace: String,
    pub key: String,
    pub value: String,
}
