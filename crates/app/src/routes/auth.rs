//! Install and OAuth route handlers.

use axum::{
    extract::{Query, RawQuery, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::{info, warn};

use super::redirect_on_error;
use crate::error::set_sentry_shop;
use crate::middleware::{error_redirect, shop_from_query};
use crate::shopify::oauth;
use crate::state::AppState;

/// `GET /install?shop=` - start the OAuth handshake.
pub async fn install(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let Some(shop) = shop_from_query(query.as_deref()) else {
        return error_redirect("bad_request").into_response();
    };
    set_sentry_shop(shop.as_str());

    match state.lifecycle().install(&shop).await {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => redirect_on_error(&e),
    }
}

/// `GET /auth/callback` - exchange the code, register webhooks and create
/// the recurring charge, then send the merchant to confirm it.
pub async fn callback(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let query = query.unwrap_or_default();
    let params: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    let borrowed: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    if !oauth::verify_query(&borrowed, state.api_secret()) {
        warn!("OAuth callback signature did not verify");
        return error_redirect("invalid_hmac").into_response();
    }

    let Some(shop) = shop_from_query(Some(&query)) else {
        return error_redirect("bad_request").into_response();
    };
    set_sentry_shop(shop.as_str());

    let Some(code) = borrowed
        .iter()
        .find(|(k, _)| *k == "code")
        .map(|(_, v)| *v)
        .filter(|v| !v.is_empty())
    else {
        return error_redirect("bad_request").into_response();
    };

    match state.lifecycle().authorize(&shop, code).await {
        Ok(confirmation_url) => {
            info!(shop = %shop, "Redirecting merchant to charge confirmation");
            Redirect::to(&confirmation_url).into_response()
        }
        Err(e) => redirect_on_error(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct FailureQuery {
    #[serde(default)]
    reason: Option<String>,
}

/// `GET /error?reason=` - minimal failure page.
pub async fn failure(Query(query): Query<FailureQuery>) -> String {
    let reason = query.reason.as_deref().unwrap_or("unknown");
    let message = match reason {
        "billing_inactive" => "This app needs an active subscription. Reinstall it from the Shopify admin to subscribe.",
        "charge_declined" => "The subscription was declined. Reinstall the app to try again.",
        "charge_not_accepted" => "The subscription has not been accepted yet.",
        "invalid_hmac" | "unauthorized" => "The request could not be verified.",
        "bad_request" => "The request was missing a valid shop.",
        "external_call_failed" => "Shopify could not be reached. Please try again shortly.",
        _ => "Something went wrong.",
    };
    format!("{message} (reason: {reason})")
}
