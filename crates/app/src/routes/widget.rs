//! Storefront widget API.
//!
//! Called from the merchant's storefront, so there is no session; the shop
//! must have activated billing or the widget is treated as absent.

use axum::{
    Json,
    extract::{RawQuery, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use howheard_core::{CustomerId, Email, ShopDomain};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, set_sentry_shop};
use crate::middleware::shop_from_query;
use crate::models::Account;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WidgetChoices {
    choices: Vec<String>,
}

/// `GET /widget/choices?shop=`
pub async fn choices(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<WidgetChoices>, AppError> {
    let shop = shop_from_query(query.as_deref())
        .ok_or_else(|| AppError::BadRequest("missing or invalid shop".to_string()))?;
    let account = widget_account(&state, &shop).await?;
    let choices = state.attribution().choices_for_widget(&account).await?;
    Ok(Json(WidgetChoices { choices }))
}

#[derive(Debug, Deserialize)]
pub struct SelectionRequest {
    shop: ShopDomain,
    #[serde(default)]
    customer_id: Option<CustomerId>,
    #[serde(default)]
    email: Option<String>,
    choice: String,
}

#[derive(Debug, Serialize)]
pub struct SelectionResponse {
    customer_id: CustomerId,
    label: String,
    updated_at: DateTime<Utc>,
}

/// `POST /widget/selections`
///
/// Identifies the customer by id when the storefront knows it, otherwise
/// by email.
pub async fn record_selection(
    State(state): State<AppState>,
    Json(request): Json<SelectionRequest>,
) -> Result<(StatusCode, Json<SelectionResponse>), AppError> {
    let account = widget_account(&state, &request.shop).await?;

    let selection = match (request.customer_id, request.email.as_deref()) {
        (Some(customer_id), _) => {
            state
                .attribution()
                .record_choice(&account.shop, customer_id, &request.choice)
                .await?
        }
        (None, Some(email)) => {
            let email = Email::parse(email)
                .map_err(|e| AppError::BadRequest(format!("invalid email: {e}")))?;
            state
                .attribution()
                .record_choice_by_email(&account, &email, &request.choice)
                .await?
        }
        (None, None) => {
            return Err(AppError::BadRequest(
                "customer_id or email is required".to_string(),
            ));
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(SelectionResponse {
            customer_id: selection.customer_id,
            label: selection.label,
            updated_at: selection.updated_at,
        }),
    ))
}

async fn widget_account(state: &AppState, shop: &ShopDomain) -> Result<Account, AppError> {
    set_sentry_shop(shop.as_str());
    state
        .lifecycle()
        .active_account(shop)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("widget for {shop}")))
}
