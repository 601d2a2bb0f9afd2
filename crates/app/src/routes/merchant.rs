//! Merchant-facing JSON endpoints behind the billing guard.

use axum::{
    Form, Json,
    extract::{Query, State},
};
use chrono::NaiveDate;
use howheard_core::{BillingKind, BillingStatus, ShopDomain};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::ActiveAccount;
use crate::services::OrdersReport;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AccountSummary {
    shop: ShopDomain,
    name: Option<String>,
    billing_status: BillingStatus,
    billing_kind: Option<BillingKind>,
    billing_activated_on: Option<NaiveDate>,
    trial_ends_on: Option<NaiveDate>,
    choices: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ChoicesResponse {
    choices: Vec<String>,
}

/// `GET /app?shop=`
pub async fn summary(
    State(state): State<AppState>,
    ActiveAccount(account): ActiveAccount,
) -> Result<Json<AccountSummary>, AppError> {
    let choices = state
        .attribution()
        .choice_list(&account)
        .await?
        .map(|list| list.choices)
        .unwrap_or_default();

    Ok(Json(AccountSummary {
        shop: account.shop,
        name: account.profile.name,
        billing_status: account.billing_status,
        billing_kind: account.billing_kind,
        billing_activated_on: account.billing_activated_on,
        trial_ends_on: account.trial_ends_on,
        choices,
    }))
}

/// `GET /app/choices?shop=` - empty until the first submission.
pub async fn list_choices(
    State(state): State<AppState>,
    ActiveAccount(account): ActiveAccount,
) -> Result<Json<ChoicesResponse>, AppError> {
    let choices = state
        .attribution()
        .choice_list(&account)
        .await?
        .map(|list| list.choices)
        .unwrap_or_default();
    Ok(Json(ChoicesResponse { choices }))
}

#[derive(Debug, Deserialize)]
pub struct AddChoicesForm {
    /// Newline-delimited labels.
    choices: String,
}

/// `POST /app/choices?shop=`
pub async fn add_choices(
    State(state): State<AppState>,
    ActiveAccount(account): ActiveAccount,
    Form(form): Form<AddChoicesForm>,
) -> Result<Json<ChoicesResponse>, AppError> {
    let list = state
        .attribution()
        .submit_choices(&account.shop, &form.choices)
        .await?;
    Ok(Json(ChoicesResponse {
        choices: list.choices,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RemoveChoiceForm {
    choice: String,
}

/// `POST /app/choices/remove?shop=`
pub async fn remove_choice(
    State(state): State<AppState>,
    ActiveAccount(account): ActiveAccount,
    Form(form): Form<RemoveChoiceForm>,
) -> Result<Json<ChoicesResponse>, AppError> {
    let list = state
        .attribution()
        .remove_choice(&account, &form.choice)
        .await?;
    Ok(Json(ChoicesResponse {
        choices: list.choices,
    }))
}

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    #[serde(default)]
    limit: Option<i64>,
}

/// `GET /app/orders?shop=&limit=`
pub async fn orders(
    State(state): State<AppState>,
    ActiveAccount(account): ActiveAccount,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<OrdersReport>, AppError> {
    let report = state
        .attribution()
        .orders_report(&account.shop, query.limit)
        .await?;
    Ok(Json(report))
}
