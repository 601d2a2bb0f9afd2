//! HTTP route handlers for the app server.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                      - Liveness check
//! GET  /health/ready                - Readiness check (database)
//!
//! # Install and OAuth
//! GET  /install?shop=               - Redirect to the Shopify authorization page
//! GET  /auth/callback               - OAuth callback; redirects to charge confirmation
//! GET  /error?reason=               - Failure page
//!
//! # Billing
//! GET  /billing/activate?shop=      - Charge accepted/declined callback
//!
//! # Webhooks (HMAC-verified)
//! POST /webhooks/app/uninstalled    - App removed from a shop
//! POST /webhooks/orders/create/{shop} - New order
//!
//! # Merchant (requires activated billing)
//! GET  /app?shop=                   - Account summary
//! GET  /app/choices?shop=           - Current choice list
//! POST /app/choices?shop=           - Add choices (form: choices)
//! POST /app/choices/remove?shop=    - Remove one choice (form: choice)
//! GET  /app/orders?shop=&limit=     - Recent orders with label counts
//!
//! # Storefront widget (CORS, requires activated billing)
//! GET  /widget/choices?shop=        - Choices to render
//! POST /widget/selections           - Record a customer's answer
//! ```

pub mod auth;
pub mod billing;
pub mod health;
pub mod merchant;
pub mod webhooks;
pub mod widget;

use axum::{
    Router,
    http::{Method, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::error::AppError;
use crate::middleware::error_redirect;
use crate::state::AppState;

/// Build the routes router.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Install and OAuth
        .route("/install", get(auth::install))
        .route("/auth/callback", get(auth::callback))
        .route("/error", get(auth::failure))
        // Billing
        .route("/billing/activate", get(billing::activate))
        // Webhooks
        .route("/webhooks/app/uninstalled", post(webhooks::app_uninstalled))
        .route("/webhooks/orders/create/{shop}", post(webhooks::orders_create))
        // Merchant
        .route("/app", get(merchant::summary))
        .route(
            "/app/choices",
            get(merchant::list_choices).post(merchant::add_choices),
        )
        .route("/app/choices/remove", post(merchant::remove_choice))
        .route("/app/orders", get(merchant::orders))
        // Storefront widget
        .merge(widget_routes())
}

/// Widget routes are called cross-origin from the merchant's storefront.
fn widget_routes() -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/widget/choices", get(widget::choices))
        .route("/widget/selections", post(widget::record_selection))
        .layer(cors)
}

/// The full application with health checks and request tracing.
///
/// Sentry layers are added by the binary on top of this.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .merge(routes())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri().path(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}

/// Browser-facing failures land on the error page instead of a bare status.
fn redirect_on_error(err: &AppError) -> Response {
    err.report();
    error_redirect(err.reason()).into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::AppConfig;
    use crate::db::MemoryStore;
    use crate::shopify::fake::FakeShopify;

    fn test_app() -> Router {
        let state = AppState::new(
            AppConfig::for_tests(),
            Arc::new(MemoryStore::new()),
            Arc::new(FakeShopify::new()),
        );
        app(state)
    }

    async fn send(request: Request<Body>) -> axum::response::Response {
        test_app().oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = send(Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_callback_without_hmac_is_rejected() {
        let response = send(
            Request::get("/auth/callback?shop=cool-store.myshopify.com&code=abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/error?reason=invalid_hmac"
        );
    }

    #[tokio::test]
    async fn test_webhook_without_signature_is_unauthorized() {
        let response = send(
            Request::post("/webhooks/orders/create/cool-store.myshopify.com")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_widget_preflight_allows_any_origin() {
        let response = send(
            Request::options("/widget/selections")
                .header(header::ORIGIN, "https://cool-store.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }
}
