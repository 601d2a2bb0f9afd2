//! Shopify REST Admin API integration.
//!
//! # Security
//!
//! Every call (except the OAuth code exchange) is made with the merchant's
//! offline access token, which grants the scopes the merchant approved on
//! install. Tokens are held as [`SecretString`] and never logged.
//!
//! # Architecture
//!
//! - [`CommercePlatform`] is the port the lifecycle and attribution services
//!   depend on; it is object-safe so services hold an `Arc<dyn CommercePlatform>`
//! - [`ShopifyClient`] implements it over HTTPS with `reqwest`
//! - [`oauth`] and [`webhook`] hold the request-authenticity helpers and the
//!   inbound webhook payload types
//!
//! # Example
//!
//! ```rust,ignore
//! use howheard_app::shopify::{CommercePlatform, ShopifyClient, WebhookTopic};
//!
//! let client = ShopifyClient::new(&config.shopify)?;
//! let token = client.exchange_code(&shop, &code).await?;
//! let profile = client.shop_profile(&shop, &token.token).await?;
//! let id = client
//!     .register_webhook(&shop, &token.token, WebhookTopic::OrdersCreate, &address)
//!     .await?;
//! ```

mod client;
#[cfg(any(test, feature = "test-utils"))]
pub mod fake;
pub mod oauth;
pub mod types;
pub mod webhook;

pub use client::ShopifyClient;
pub use types::*;

use async_trait::async_trait;
use howheard_core::{ChargeId, CustomerId, Email, ShopDomain, WebhookId};
use secrecy::SecretString;
use thiserror::Error;

/// Errors that can occur when calling the Shopify Admin API.
#[derive(Debug, Error)]
pub enum ShopifyError {
    /// Transport-level failure (connect, TLS, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Shopify answered with a non-success status.
    #[error("Shopify returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// Response body did not match the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rate limited by Shopify.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Access token missing, revoked, or lacking a scope.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl ShopifyError {
    /// HTTP status reported by Shopify, if the failure came from a response.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::RateLimited(_) => Some(429),
            Self::Unauthorized(_) => Some(401),
            Self::Http(_) | Self::Parse(_) => None,
        }
    }
}

/// The outbound calls the app makes to the commerce platform.
///
/// Pure request/response: implementations hold no per-shop state.
#[async_trait]
pub trait CommercePlatform: Send + Sync {
    /// Exchange an OAuth authorization code for an offline access token.
    async fn exchange_code(&self, shop: &ShopDomain, code: &str)
    -> Result<AccessToken, ShopifyError>;

    /// Fetch the shop's profile (`GET /shop.json`).
    async fn shop_profile(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
    ) -> Result<ShopProfile, ShopifyError>;

    /// Register a webhook subscription, returning its ID.
    ///
    /// Registering a topic/address pair that already exists returns the
    /// existing subscription's ID.
    async fn register_webhook(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        topic: WebhookTopic,
        address: &str,
    ) -> Result<WebhookId, ShopifyError>;

    /// Create a recurring application charge awaiting merchant confirmation.
    async fn create_recurring_charge(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        request: &RecurringChargeRequest,
    ) -> Result<RecurringCharge, ShopifyError>;

    /// Fetch a recurring charge, including its live status.
    async fn recurring_charge(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        charge_id: ChargeId,
    ) -> Result<RecurringCharge, ShopifyError>;

    /// Activate an accepted recurring charge.
    async fn activate_recurring_charge(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        charge: &RecurringCharge,
    ) -> Result<RecurringCharge, ShopifyError>;

    /// Find a customer by email.
    async fn search_customer_by_email(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        email: &Email,
    ) -> Result<Option<CustomerSummary>, ShopifyError>;

    /// Create a metafield on a customer.
    async fn create_customer_metafield(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        customer_id: CustomerId,
        metafield: &MetafieldInput,
    ) -> Result<Metafield, ShopifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display_carries_body() {
        let err = ShopifyError::Api {
            status: 422,
            body: r#"{"errors":{"price":["must be positive"]}}"#.to_string(),
        };
        assert_eq!(
            err.to_string(),
            r#"Shopify returned 422: {"errors":{"price":["must be positive"]}}"#
        );
        assert_eq!(err.status(), Some(422));
    }

    #[test]
    fn test_rate_limited_error() {
        let err = ShopifyError::RateLimited(2);
        assert_eq!(err.to_string(), "Rate limited, retry after 2 seconds");
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn test_unauthorized_error() {
        let err = ShopifyError::Unauthorized("Invalid API key or access token".to_string());
        assert_eq!(
            err.to_string(),
            "Unauthorized: Invalid API key or access token"
        );
        assert_eq!(err.status(), Some(401));
    }
}
