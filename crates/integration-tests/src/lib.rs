//! Integration tests for howheard.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p howheard-integration-tests
//! ```
//!
//! The full router runs in-process against the in-memory store and the
//! recording Shopify fake, so no database or network is needed.
//!
//! # Test Categories
//!
//! - `install_billing` - Install, OAuth callback, charge activation and the billing gate
//! - `attribution` - Order webhooks, widget selections and metafield write-back
//! - `choices` - Merchant choice list management
//! - `uninstall` - Uninstall webhook handling

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode, header},
};
use howheard_app::config::{AppConfig, TEST_API_SECRET};
use howheard_app::db::MemoryStore;
use howheard_app::services::AttributionService;
use howheard_app::shopify::fake::FakeShopify;
use howheard_app::shopify::{oauth, webhook};
use howheard_app::state::AppState;
use howheard_core::ShopDomain;
use serde_json::{Value, json};
use tower::ServiceExt;

/// Shop used by most tests.
pub const SHOP: &str = "cool-store.myshopify.com";

/// The app router wired to in-memory collaborators.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub shopify: Arc<FakeShopify>,
    router: Router,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(AppConfig::for_tests())
    }

    #[must_use]
    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let shopify = Arc::new(FakeShopify::new());
        let state = AppState::new(config, store.clone(), shopify.clone());
        Self {
            store,
            shopify,
            router: howheard_app::routes::app(state),
        }
    }

    /// An attribution service over the same collaborators, for driving
    /// reconciliation the way the CLI does.
    #[must_use]
    pub fn attribution(&self) -> AttributionService {
        AttributionService::new(self.store.clone(), self.shopify.clone())
    }

    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.request(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_form(&self, uri: &str, body: &str) -> Response<Body> {
        self.request(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> Response<Body> {
        self.request(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// POST a webhook signed with the test secret.
    pub async fn post_webhook(&self, uri: &str, shop: &str, body: &Value) -> Response<Body> {
        let body = body.to_string();
        let signature = webhook::sign_body(body.as_bytes(), TEST_API_SECRET);
        self.request(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .header(webhook::HMAC_HEADER, signature)
                .header(webhook::SHOP_DOMAIN_HEADER, shop)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// Deliver `orders/create` for `shop`.
    pub async fn deliver_order(&self, shop: &str, order: &Value) -> Response<Body> {
        self.post_webhook(&format!("/webhooks/orders/create/{shop}"), shop, order)
            .await
    }

    /// Run install plus the OAuth callback; returns the callback response.
    pub async fn authorize(&self, shop: &str) -> Response<Body> {
        let response = self.get(&format!("/install?shop={shop}")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        self.get(&callback_uri(shop, "auth-code")).await
    }

    /// Install, authorize and accept the charge, leaving billing activated.
    pub async fn onboard(&self, shop: &str) {
        let response = self.authorize(shop).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let response = self.get(&format!("/billing/activate?shop={shop}")).await;
        assert_eq!(location(&response), format!("/app?shop={}", urlencoding::encode(shop)));
    }

    /// Onboard and submit an initial choice list.
    pub async fn onboard_with_choices(&self, shop: &str, choices: &[&str]) {
        self.onboard(shop).await;
        let body = format!("choices={}", urlencoding::encode(&choices.join("\n")));
        let response = self
            .post_form(&format!("/app/choices?shop={shop}"), &body)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    /// Record a widget selection by customer id.
    pub async fn select(&self, shop: &str, customer_id: i64, choice: &str) -> Response<Body> {
        self.post_json(
            "/widget/selections",
            &json!({ "shop": shop, "customer_id": customer_id, "choice": choice }),
        )
        .await
    }
}

/// OAuth callback URI with a valid `hmac`.
#[must_use]
pub fn callback_uri(shop: &str, code: &str) -> String {
    let params = [
        ("code", code),
        ("shop", shop),
        ("state", "nonce"),
        ("timestamp", "1710000000"),
    ];
    let hmac = oauth::sign_query(params.iter().copied(), TEST_API_SECRET);
    format!("/auth/callback?code={code}&shop={shop}&state=nonce&timestamp=1710000000&hmac={hmac}")
}

/// An `orders/create` payload from the online store.
///
/// `orders_count` counts this order, so `1` means a first-time customer.
#[must_use]
pub fn order_payload(order_number: i64, customer_id: i64, orders_count: i64) -> Value {
    json!({
        "id": 450_789_000 + order_number,
        "order_number": order_number,
        "created_at": "2024-03-13T16:09:54-04:00",
        "source_name": "web",
        "email": "bob@example.com",
        "customer": {
            "id": customer_id,
            "email": "bob@example.com",
            "first_name": "Bob",
            "last_name": "Norman",
            "orders_count": orders_count,
            "total_spent": "199.65",
            "default_address": {
                "address1": "Chestnut Street 92",
                "city": "Louisville",
                "province": "Kentucky",
                "country": "United States",
                "zip": "40202"
            }
        }
    })
}

#[must_use]
pub fn shop(domain: &str) -> ShopDomain {
    ShopDomain::parse(domain).unwrap()
}

/// The `Location` header of a redirect.
#[must_use]
pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
