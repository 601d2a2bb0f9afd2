//! Webhook receivers.
//!
//! Bodies are verified by [`SignedWebhook`] before these handlers run. A
//! non-2xx response makes Shopify redeliver, which is safe: order ingestion
//! dedups on the order number and uninstall is idempotent.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use howheard_core::ShopDomain;
use serde::Serialize;
use tracing::info;

use crate::error::{AppError, set_sentry_shop};
use crate::middleware::SignedWebhook;
use crate::services::IngestOutcome;
use crate::shopify::webhook::{AppUninstalled, OrderCreated};
use crate::state::AppState;

/// `POST /webhooks/app/uninstalled`
///
/// The shop comes from `X-Shopify-Shop-Domain`, falling back to the body.
pub async fn app_uninstalled(
    State(state): State<AppState>,
    webhook: SignedWebhook,
) -> Result<StatusCode, AppError> {
    let raw = match webhook.shop {
        Some(shop) => shop,
        None => {
            let payload: AppUninstalled = serde_json::from_slice(&webhook.body)
                .map_err(|e| AppError::BadRequest(format!("invalid uninstall payload: {e}")))?;
            payload
                .myshopify_domain
                .ok_or_else(|| AppError::Unresolvable("uninstall without a shop".to_string()))?
        }
    };
    let shop = ShopDomain::parse(&raw)
        .map_err(|e| AppError::Unresolvable(format!("uninstall for {raw}: {e}")))?;
    set_sentry_shop(shop.as_str());

    state.lifecycle().uninstall(&shop).await?;
    info!(shop = %shop, "App uninstalled");
    Ok(StatusCode::OK)
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
}

impl From<IngestOutcome> for IngestResponse {
    fn from(outcome: IngestOutcome) -> Self {
        match outcome {
            IngestOutcome::OutOfScope => Self {
                outcome: "out_of_scope",
                label: None,
            },
            IngestOutcome::Duplicate => Self {
                outcome: "duplicate",
                label: None,
            },
            IngestOutcome::Skipped => Self {
                outcome: "skipped",
                label: None,
            },
            IngestOutcome::Attributed { label, .. } => Self {
                outcome: "attributed",
                label: Some(label),
            },
        }
    }
}

/// `POST /webhooks/orders/create/{shop}`
///
/// The shop is part of the registered address, so each subscription is
/// bound to one account.
pub async fn orders_create(
    State(state): State<AppState>,
    Path(shop): Path<String>,
    webhook: SignedWebhook,
) -> Result<Json<IngestResponse>, AppError> {
    let shop = ShopDomain::parse(&shop)
        .map_err(|e| AppError::Unresolvable(format!("orders webhook for {shop}: {e}")))?;
    set_sentry_shop(shop.as_str());

    if let Some(sender) = webhook.shop.as_deref()
        && ShopDomain::parse(sender).ok().as_ref() != Some(&shop)
    {
        return Err(AppError::BadRequest(format!(
            "webhook sent by {sender} to the address of {shop}"
        )));
    }

    let order: OrderCreated = serde_json::from_slice(&webhook.body)
        .map_err(|e| AppError::BadRequest(format!("invalid order payload: {e}")))?;

    let outcome = state
        .attribution()
        .ingest_order_event(&shop, &order)
        .await?;
    Ok(Json(outcome.into()))
}
