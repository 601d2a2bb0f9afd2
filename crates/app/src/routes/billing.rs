//! Billing callback.

use axum::{
    extract::{RawQuery, State},
    response::{IntoResponse, Redirect, Response},
};
use howheard_core::BillingStatus;

use super::redirect_on_error;
use crate::error::set_sentry_shop;
use crate::middleware::{error_redirect, shop_from_query};
use crate::services::ActivationOutcome;
use crate::state::AppState;

/// `GET /billing/activate?shop=&charge_id=` - Shopify sends the merchant
/// here after they accept or decline the charge. The stored charge id is
/// authoritative; the one in the query is ignored.
pub async fn activate(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let Some(shop) = shop_from_query(query.as_deref()) else {
        return error_redirect("bad_request").into_response();
    };
    set_sentry_shop(shop.as_str());

    match state.lifecycle().activate(&shop).await {
        Ok(ActivationOutcome::Activated(_)) => {
            Redirect::to(&format!("/app?shop={}", urlencoding::encode(shop.as_str())))
                .into_response()
        }
        Ok(ActivationOutcome::Halted { billing_status, .. }) => {
            let reason = if billing_status == BillingStatus::Declined {
                "charge_declined"
            } else {
                "charge_not_accepted"
            };
            error_redirect(reason).into_response()
        }
        Err(e) => redirect_on_error(&e),
    }
}
