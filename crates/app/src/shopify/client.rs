//! REST Admin API client.

use std::sync::Arc;

use async_trait::async_trait;
use howheard_core::{ChargeId, CustomerId, Email, ShopDomain, WebhookId};
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::types::{
    AccessToken, CustomerSummary, Metafield, MetafieldInput, RecurringCharge,
    RecurringChargeRequest, ShopProfile, Webhook, WebhookTopic,
};
use super::{CommercePlatform, ShopifyError};
use crate::config::ShopifyAppConfig;

/// Header carrying the offline access token on Admin API calls.
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Shopify REST Admin API client.
///
/// Holds the app credentials; the per-shop access token is passed in on
/// every call. Cheap to clone.
#[derive(Clone)]
pub struct ShopifyClient {
    inner: Arc<ShopifyClientInner>,
}

struct ShopifyClientInner {
    client: reqwest::Client,
    api_key: String,
    api_secret: SecretString,
    api_version: String,
}

impl std::fmt::Debug for ShopifyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyClient")
            .field("api_key", &self.inner.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("api_version", &self.inner.api_version)
            .finish_non_exhaustive()
    }
}

// Response envelopes. The REST API wraps every resource in a named key.

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    #[serde(default)]
    scope: String,
}

#[derive(Deserialize)]
struct ShopEnvelope {
    shop: ShopProfile,
}

#[derive(Serialize)]
struct WebhookCreate<'a> {
    webhook: WebhookCreateBody<'a>,
}

#[derive(Serialize)]
struct WebhookCreateBody<'a> {
    topic: &'a str,
    address: &'a str,
    format: &'a str,
}

#[derive(Deserialize)]
struct WebhookEnvelope {
    webhook: Webhook,
}

#[derive(Deserialize)]
struct WebhooksEnvelope {
    webhooks: Vec<Webhook>,
}

#[derive(Serialize)]
struct ChargeCreate<'a> {
    recurring_application_charge: &'a RecurringChargeRequest,
}

#[derive(Serialize)]
struct ChargeActivate<'a> {
    recurring_application_charge: &'a RecurringCharge,
}

#[derive(Deserialize)]
struct ChargeEnvelope {
    recurring_application_charge: RecurringCharge,
}

#[derive(Deserialize)]
struct CustomersEnvelope {
    customers: Vec<CustomerSummary>,
}

#[derive(Serialize)]
struct MetafieldCreate<'a> {
    metafield: &'a MetafieldInput,
}

#[derive(Deserialize)]
struct MetafieldEnvelope {
    metafield: Metafield,
}

impl ShopifyClient {
    /// Create a new client from the app configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &ShopifyAppConfig) -> Result<Self, ShopifyError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(ShopifyClientInner {
                client,
                api_key: config.api_key.clone(),
                api_secret: config.api_secret.clone(),
                api_version: config.api_version.clone(),
            }),
        })
    }

    fn admin_url(&self, shop: &ShopDomain, path: &str) -> String {
        format!(
            "https://{shop}/admin/api/{}/{path}",
            self.inner.api_version
        )
    }

    fn request(
        &self,
        method: Method,
        shop: &ShopDomain,
        token: &SecretString,
        path: &str,
    ) -> RequestBuilder {
        self.inner
            .client
            .request(method, self.admin_url(shop, path))
            .header(ACCESS_TOKEN_HEADER, token.expose_secret())
    }

    /// Send a request and decode a successful JSON body.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ShopifyError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            return Ok(serde_json::from_str(&body)?);
        }

        Err(Self::error_from(response).await)
    }

    async fn error_from(response: reqwest::Response) -> ShopifyError {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                // Shopify sends fractional seconds ("2.0")
                .and_then(|s| s.split('.').next())
                .and_then(|s| s.parse().ok())
                .unwrap_or(2);
            return ShopifyError::RateLimited(retry_after);
        }

        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return ShopifyError::Unauthorized(body);
        }

        ShopifyError::Api {
            status: status.as_u16(),
            body,
        }
    }

    /// Find an existing subscription for `topic` at `address`.
    async fn find_webhook(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        topic: WebhookTopic,
        address: &str,
    ) -> Result<Option<Webhook>, ShopifyError> {
        let request = self
            .request(Method::GET, shop, token, "webhooks.json")
            .query(&[("topic", topic.as_str()), ("address", address)]);
        let envelope: WebhooksEnvelope = self.send(request).await?;
        Ok(envelope
            .webhooks
            .into_iter()
            .find(|w| w.topic == topic.as_str() && w.address == address))
    }
}

#[async_trait]
impl CommercePlatform for ShopifyClient {
    #[instrument(skip(self, code), fields(shop = %shop))]
    async fn exchange_code(
        &self,
        shop: &ShopDomain,
        code: &str,
    ) -> Result<AccessToken, ShopifyError> {
        let request = self
            .inner
            .client
            .post(format!("https://{shop}/admin/oauth/access_token"))
            .form(&[
                ("client_id", self.inner.api_key.as_str()),
                ("client_secret", self.inner.api_secret.expose_secret()),
                ("code", code),
            ]);

        let response: AccessTokenResponse = self.send(request).await?;
        debug!(scope = %response.scope, "Exchanged OAuth code for access token");

        Ok(AccessToken {
            token: SecretString::from(response.access_token),
            scopes: response
                .scope
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        })
    }

    #[instrument(skip(self, token), fields(shop = %shop))]
    async fn shop_profile(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
    ) -> Result<ShopProfile, ShopifyError> {
        let envelope: ShopEnvelope = self
            .send(self.request(Method::GET, shop, token, "shop.json"))
            .await?;
        Ok(envelope.shop)
    }

    #[instrument(skip(self, token), fields(shop = %shop, topic = %topic))]
    async fn register_webhook(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        topic: WebhookTopic,
        address: &str,
    ) -> Result<WebhookId, ShopifyError> {
        let body = WebhookCreate {
            webhook: WebhookCreateBody {
                topic: topic.as_str(),
                address,
                format: "json",
            },
        };
        let request = self
            .request(Method::POST, shop, token, "webhooks.json")
            .json(&body);

        match self.send::<WebhookEnvelope>(request).await {
            Ok(envelope) => Ok(envelope.webhook.id),
            // 422 "address for this topic has already been taken"
            Err(ShopifyError::Api { status: 422, body }) => {
                warn!(%body, "Webhook already registered, looking up existing subscription");
                self.find_webhook(shop, token, topic, address)
                    .await?
                    .map(|w| w.id)
                    .ok_or(ShopifyError::Api { status: 422, body })
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, token, request), fields(shop = %shop))]
    async fn create_recurring_charge(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        request: &RecurringChargeRequest,
    ) -> Result<RecurringCharge, ShopifyError> {
        let body = ChargeCreate {
            recurring_application_charge: request,
        };
        let envelope: ChargeEnvelope = self
            .send(
                self.request(
                    Method::POST,
                    shop,
                    token,
                    "recurring_application_charges.json",
                )
                .json(&body),
            )
            .await?;
        Ok(envelope.recurring_application_charge)
    }

    #[instrument(skip(self, token), fields(shop = %shop, charge_id = %charge_id))]
    async fn recurring_charge(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        charge_id: ChargeId,
    ) -> Result<RecurringCharge, ShopifyError> {
        let path = format!("recurring_application_charges/{charge_id}.json");
        let envelope: ChargeEnvelope = self
            .send(self.request(Method::GET, shop, token, &path))
            .await?;
        Ok(envelope.recurring_application_charge)
    }

    #[instrument(skip(self, token, charge), fields(shop = %shop, charge_id = %charge.id))]
    async fn activate_recurring_charge(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        charge: &RecurringCharge,
    ) -> Result<RecurringCharge, ShopifyError> {
        let path = format!("recurring_application_charges/{}/activate.json", charge.id);
        let body = ChargeActivate {
            recurring_application_charge: charge,
        };
        let envelope: ChargeEnvelope = self
            .send(self.request(Method::POST, shop, token, &path).json(&body))
            .await?;
        Ok(envelope.recurring_application_charge)
    }

    #[instrument(skip(self, token, email), fields(shop = %shop))]
    async fn search_customer_by_email(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        email: &Email,
    ) -> Result<Option<CustomerSummary>, ShopifyError> {
        let query = format!("email:{email}");
        let request = self
            .request(Method::GET, shop, token, "customers/search.json")
            .query(&[("query", query.as_str()), ("limit", "1")]);
        let envelope: CustomersEnvelope = self.send(request).await?;
        Ok(envelope.customers.into_iter().next())
    }

    #[instrument(skip(self, token, metafield), fields(shop = %shop, customer_id = %customer_id))]
    async fn create_customer_metafield(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        customer_id: CustomerId,
        metafield: &MetafieldInput,
    ) -> Result<Metafield, ShopifyError> {
        let path = format!("customers/{customer_id}/metafields.json");
        let body = MetafieldCreate { metafield };
        let envelope: MetafieldEnvelope = self
            .send(self.request(Method::POST, shop, token, &path).json(&body))
            .await?;
        Ok(envelope.metafield)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config() -> ShopifyAppConfig {
        ShopifyAppConfig {
            api_key: "key".to_string(),
            api_secret: SecretString::from("secret"),
            api_version: "2024-01".to_string(),
            scopes: vec!["read_orders".to_string()],
            http_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_admin_url() {
        let client = ShopifyClient::new(&config()).unwrap();
        let shop = ShopDomain::parse("cool-store.myshopify.com").unwrap();
        assert_eq!(
            client.admin_url(&shop, "shop.json"),
            "https://cool-store.myshopify.com/admin/api/2024-01/shop.json"
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let client = ShopifyClient::new(&config()).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("\"secret\""));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_envelope_shapes() {
        let json = r#"{"customers":[{"id":207119551,"email":"bob@example.com","orders_count":1}]}"#;
        let envelope: CustomersEnvelope = serde_json::from_str(json).unwrap();
        let customer = envelope.customers.first().unwrap();
        assert_eq!(customer.id, CustomerId::new(207_119_551));

        let json = r#"{"access_token":"shpat_x","scope":"read_orders,write_customers"}"#;
        let token: AccessTokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.scope, "read_orders,write_customers");
    }
}
