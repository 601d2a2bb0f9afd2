//! Billing guard for the merchant-facing routes.

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use howheard_core::ShopDomain;

use crate::error::{AppError, set_sentry_shop};
use crate::models::Account;
use crate::state::AppState;

/// Extractor that requires an account with activated billing.
///
/// The shop is read from the `shop` query parameter, which Shopify appends
/// to every embedded-app request.
///
/// # Example
///
/// ```rust,ignore
/// async fn dashboard(ActiveAccount(account): ActiveAccount) -> impl IntoResponse {
///     format!("Hello, {}!", account.shop)
/// }
/// ```
pub struct ActiveAccount(pub Account);

/// Why the billing guard turned a request away.
#[derive(Debug)]
pub enum BillingRejection {
    /// No `shop` parameter, or one that is not a myshopify domain.
    InvalidShop,
    /// The account is missing, uninstalled or not yet paying.
    Inactive,
    /// The lookup itself failed.
    Failed(AppError),
}

impl IntoResponse for BillingRejection {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidShop => error_redirect("bad_request").into_response(),
            Self::Inactive => error_redirect("billing_inactive").into_response(),
            Self::Failed(err) => {
                err.report();
                error_redirect(err.reason()).into_response()
            }
        }
    }
}

impl FromRequestParts<AppState> for ActiveAccount {
    type Rejection = BillingRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let shop = shop_from_query(parts.uri.query()).ok_or(BillingRejection::InvalidShop)?;
        set_sentry_shop(shop.as_str());

        let account = state
            .lifecycle()
            .active_account(&shop)
            .await
            .map_err(BillingRejection::Failed)?
            .ok_or_else(|| {
                tracing::info!(shop = %shop, "Billing inactive, request turned away");
                BillingRejection::Inactive
            })?;

        Ok(Self(account))
    }
}

/// Pull a valid `shop` out of a raw query string.
#[must_use]
pub fn shop_from_query(query: Option<&str>) -> Option<ShopDomain> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "shop")
        .and_then(|(_, value)| ShopDomain::parse(&value).ok())
}

/// Redirect to the failure page with a machine-readable reason.
#[must_use]
pub fn error_redirect(reason: &str) -> Redirect {
    Redirect::to(&format!("/error?reason={}", urlencoding::encode(reason)))
}
