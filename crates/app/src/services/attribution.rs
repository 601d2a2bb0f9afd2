//! Order attribution: join order webhooks with widget selections.
//!
//! The widget submission and the `orders/create` webhook race each other.
//! Both write through the same keyed store, so whichever lands second sees
//! the first:
//!
//! - selection first: the webhook picks up the customer's label
//! - webhook first: the order resolves to [`DID_NOT_ANSWER`], and a later
//!   selection only updates the selection row
//!
//! Order records are deduplicated on `(shop, order_number)` before any
//! platform call, so redelivered webhooks never write twice. A record whose
//! writeback failed stays `pending` until [`AttributionService::reconcile_pending`]
//! picks it up.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use howheard_core::{
    AttributionStatus, CustomerId, DID_NOT_ANSWER, Email, MAX_CHOICE_LENGTH, MetafieldId, OrderId,
    ShopDomain, with_fallbacks,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::lifecycle::account_token;
use crate::db::AccountStore;
use crate::error::AppError;
use crate::models::{Account, AttributionChoiceList, CustomerSelection, NewOrderRecord, OrderRecord};
use crate::shopify::webhook::OrderCreated;
use crate::shopify::{CommercePlatform, MetafieldInput};

/// Default number of orders in a report.
pub const DEFAULT_REPORT_LIMIT: i64 = 50;

/// Largest report page.
pub const MAX_REPORT_LIMIT: i64 = 250;

/// Largest number of pending orders handled by one reconciliation run.
///
/// Orders that fail are retried after every other pending order has had a
/// turn.
pub const RECONCILE_BATCH: i64 = 500;

/// What happened to an order webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Not an online-store checkout; ignored.
    OutOfScope,
    /// Already received; nothing done.
    Duplicate,
    /// Recorded, but not attributable (repeat customer or guest).
    Skipped,
    /// Recorded and the label written back.
    Attributed {
        label: String,
        metafield_id: MetafieldId,
    },
}

/// Orders plus per-label totals for the merchant report.
#[derive(Debug, Clone, Serialize)]
pub struct OrdersReport {
    pub orders: Vec<OrderRecord>,
    pub counts: Vec<LabelCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

/// Totals from one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub examined: usize,
    pub resolved: usize,
    pub failed: usize,
}

/// Attribution correlator and choice list management.
pub struct AttributionService {
    store: Arc<dyn AccountStore>,
    platform: Arc<dyn CommercePlatform>,
}

impl AttributionService {
    /// Create a new attribution service.
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>, platform: Arc<dyn CommercePlatform>) -> Self {
        Self { store, platform }
    }

    /// Record the label a customer picked in the widget.
    ///
    /// Creates the selection or overwrites its label. Never calls the platform
    /// and never touches an already-resolved order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for an empty or over-long label.
    #[instrument(skip(self, label), fields(shop = %shop, customer_id = %customer_id))]
    pub async fn record_choice(
        &self,
        shop: &ShopDomain,
        customer_id: CustomerId,
        label: &str,
    ) -> Result<CustomerSelection, AppError> {
        let label = normalize_label(label)?;
        let selection = self
            .store
            .upsert_selection_label(shop, customer_id, &label)
            .await?;
        debug!(label = %selection.label, "Recorded customer selection");
        Ok(selection)
    }

    /// Record a selection for a customer known only by email.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no customer has that email, plus the
    /// errors of [`Self::record_choice`] and the platform search.
    #[instrument(skip(self, account, email, label), fields(shop = %account.shop))]
    pub async fn record_choice_by_email(
        &self,
        account: &Account,
        email: &Email,
        label: &str,
    ) -> Result<CustomerSelection, AppError> {
        let token = account_token(account)?;
        let customer = self
            .platform
            .search_customer_by_email(&account.shop, token, email)
            .await?
            .ok_or_else(|| AppError::NotFound("customer".to_string()))?;
        self.record_choice(&account.shop, customer.id, label).await
    }

    /// Ingest an `orders/create` webhook.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unresolvable` if the shop has no account, and
    /// `AppError::ExternalCallFailed` if the metafield write fails. In the
    /// latter case the order record stays `pending`; a redelivery is
    /// reported as a duplicate.
    #[instrument(
        skip(self, order),
        fields(shop = %shop, order_number = order.order_number)
    )]
    pub async fn ingest_order_event(
        &self,
        shop: &ShopDomain,
        order: &OrderCreated,
    ) -> Result<IngestOutcome, AppError> {
        if !order.is_web_checkout() {
            debug!(source = ?order.source_name, "Order not from web checkout");
            return Ok(IngestOutcome::OutOfScope);
        }

        let account = self
            .store
            .find_account(shop)
            .await?
            .ok_or_else(|| AppError::Unresolvable(format!("no account for {shop}")))?;

        if self
            .store
            .find_order(shop, order.order_number)
            .await?
            .is_some()
        {
            debug!("Duplicate order delivery");
            return Ok(IngestOutcome::Duplicate);
        }

        let record = NewOrderRecord::from_webhook(shop, order);
        if !self.store.insert_order(&record).await? {
            // Lost the insert race to a concurrent delivery
            debug!("Duplicate order delivery");
            return Ok(IngestOutcome::Duplicate);
        }

        let customer_id = match (record.attribution_status, record.customer.customer_id) {
            (AttributionStatus::Pending, Some(id)) => id,
            _ => {
                debug!("Not a first order");
                return Ok(IngestOutcome::Skipped);
            }
        };

        let (label, metafield_id) = self.resolve(&account, order.id, customer_id).await?;
        info!(%label, %metafield_id, "Order attributed");
        Ok(IngestOutcome::Attributed {
            label,
            metafield_id,
        })
    }

    /// Pick the label, write it to the customer and mark the order resolved.
    async fn resolve(
        &self,
        account: &Account,
        order_id: OrderId,
        customer_id: CustomerId,
    ) -> Result<(String, MetafieldId), AppError> {
        let shop = &account.shop;
        let token = account_token(account)?;

        let label = self
            .store
            .find_selection(shop, customer_id)
            .await?
            .map_or_else(|| DID_NOT_ANSWER.to_string(), |s| s.label);

        let metafield = self
            .platform
            .create_customer_metafield(shop, token, customer_id, &MetafieldInput::attribution(&label))
            .await?;

        self.store
            .attach_confirmation(shop, customer_id, &label, metafield.id)
            .await?;
        if !self.store.resolve_order(shop, order_id, &label).await? {
            debug!(%order_id, "Order already resolved");
        }

        Ok((label, metafield.id))
    }

    /// Re-run attribution for orders left `pending` longer than `min_age`.
    ///
    /// Failures are logged and counted; one bad order does not stop the run.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the pending orders cannot be listed.
    #[instrument(skip(self))]
    pub async fn reconcile_pending(
        &self,
        min_age: chrono::Duration,
    ) -> Result<ReconcileSummary, AppError> {
        let cutoff = Utc::now() - min_age;
        let pending = self
            .store
            .list_pending_orders(cutoff, RECONCILE_BATCH)
            .await?;

        let mut summary = ReconcileSummary {
            examined: pending.len(),
            ..ReconcileSummary::default()
        };

        for order in pending {
            match self.reconcile_one(&order).await {
                Ok(label) => {
                    info!(shop = %order.shop, order_number = order.order_number, %label, "Reconciled order");
                    summary.resolved += 1;
                }
                Err(e) => {
                    warn!(
                        shop = %order.shop,
                        order_number = order.order_number,
                        error = %e,
                        "Reconciliation failed"
                    );
                    summary.failed += 1;
                    if let Err(e) = self
                        .store
                        .mark_reconcile_attempt(&order.shop, order.order_id)
                        .await
                    {
                        warn!(error = %e, "Failed to record reconciliation attempt");
                    }
                }
            }
        }

        Ok(summary)
    }

    async fn reconcile_one(&self, order: &OrderRecord) -> Result<String, AppError> {
        let account = self
            .store
            .find_account(&order.shop)
            .await?
            .ok_or_else(|| AppError::Unresolvable(format!("no account for {}", order.shop)))?;
        let customer_id = order
            .customer
            .customer_id
            .ok_or_else(|| AppError::Internal("pending order without customer".to_string()))?;
        let (label, _) = self.resolve(&account, order.order_id, customer_id).await?;
        Ok(label)
    }

    /// Apply a merchant's newline-delimited choice submission.
    ///
    /// The first submission creates the list with the fallback labels
    /// appended; later ones add only labels not already present. The list is
    /// (re)linked to the account either way.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the shop has no account and
    /// `AppError::BadRequest` if a label is too long.
    #[instrument(skip(self, raw), fields(shop = %shop))]
    pub async fn submit_choices(
        &self,
        shop: &ShopDomain,
        raw: &str,
    ) -> Result<AttributionChoiceList, AppError> {
        let choices = parse_choices(raw)?;
        let account = self
            .store
            .find_account(shop)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("account {shop}")))?;

        let list = match self.store.find_choice_list(shop).await? {
            Some(_) => self.store.add_choices(shop, &choices).await?,
            None => match self
                .store
                .create_choice_list(shop, &with_fallbacks(&choices))
                .await?
            {
                Some(list) => list,
                // Created concurrently; fall back to a union
                None => self.store.add_choices(shop, &choices).await?,
            },
        };

        if account.choice_list_id != Some(list.id) {
            self.store.link_choice_list(shop, list.id).await?;
        }

        info!(choices = list.choices.len(), "Choice list updated");
        Ok(list)
    }

    /// Remove one label from the account's linked list.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the account has no linked list.
    #[instrument(skip(self, account), fields(shop = %account.shop))]
    pub async fn remove_choice(
        &self,
        account: &Account,
        label: &str,
    ) -> Result<AttributionChoiceList, AppError> {
        if self.choice_list(account).await?.is_none() {
            return Err(AppError::NotFound(format!("choice list for {}", account.shop)));
        }
        Ok(self.store.remove_choice(&account.shop, label.trim()).await?)
    }

    /// The account's linked choice list.
    ///
    /// A list left over from before an uninstall is kept in storage but is
    /// not returned until a submission links it again.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the lookup fails.
    pub async fn choice_list(
        &self,
        account: &Account,
    ) -> Result<Option<AttributionChoiceList>, AppError> {
        let Some(linked) = account.choice_list_id else {
            return Ok(None);
        };
        Ok(self
            .store
            .find_choice_list(&account.shop)
            .await?
            .filter(|list| list.id == linked))
    }

    /// Choices to show in the storefront widget.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the account has no linked list.
    pub async fn choices_for_widget(&self, account: &Account) -> Result<Vec<String>, AppError> {
        self.choice_list(account)
            .await?
            .map(|list| list.choices)
            .ok_or_else(|| AppError::NotFound(format!("choice list for {}", account.shop)))
    }

    /// Recent orders and how many resolved to each label.
    ///
    /// `limit` is clamped to `1..=250`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the query fails.
    pub async fn orders_report(
        &self,
        shop: &ShopDomain,
        limit: Option<i64>,
    ) -> Result<OrdersReport, AppError> {
        let limit = limit
            .unwrap_or(DEFAULT_REPORT_LIMIT)
            .clamp(1, MAX_REPORT_LIMIT);
        let orders = self.store.list_orders(shop, limit).await?;
        let counts = label_counts(&orders);
        Ok(OrdersReport { orders, counts })
    }
}

/// Trim a label and enforce its length bounds.
fn normalize_label(label: &str) -> Result<String, AppError> {
    let label = label.trim();
    if label.is_empty() {
        return Err(AppError::BadRequest("choice cannot be empty".to_string()));
    }
    if label.chars().count() > MAX_CHOICE_LENGTH {
        return Err(AppError::BadRequest(format!(
            "choice must be at most {MAX_CHOICE_LENGTH} characters"
        )));
    }
    Ok(label.to_string())
}

/// Split a newline-delimited submission into trimmed, unique labels.
///
/// Blank lines are dropped.
///
/// # Errors
///
/// Returns `AppError::BadRequest` if any label is longer than 255 characters.
pub fn parse_choices(raw: &str) -> Result<Vec<String>, AppError> {
    let mut choices: Vec<String> = Vec::new();
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        let label = normalize_label(line)?;
        if !choices.contains(&label) {
            choices.push(label);
        }
    }
    Ok(choices)
}

/// Per-label totals over resolved orders, most common first.
fn label_counts(orders: &[OrderRecord]) -> Vec<LabelCount> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for label in orders.iter().filter_map(|o| o.attribution.as_deref()) {
        *counts.entry(label).or_default() += 1;
    }
    let mut counts: Vec<LabelCount> = counts
        .into_iter()
        .map(|(label, count)| LabelCount {
            label: label.to_string(),
            count,
        })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    counts
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::CustomerSnapshot;
    use crate::shopify::fake::FakeShopify;

    fn shop() -> ShopDomain {
        ShopDomain::parse("cool-store.myshopify.com").unwrap()
    }

    fn record(number: i64, attribution: Option<&str>) -> OrderRecord {
        OrderRecord {
            shop: shop(),
            order_id: OrderId::new(number),
            order_number: number,
            customer: CustomerSnapshot::default(),
            ordered_at: Utc::now(),
            attribution: attribution.map(String::from),
            attribution_status: if attribution.is_some() {
                AttributionStatus::Resolved
            } else {
                AttributionStatus::Skipped
            },
            received_at: Utc::now(),
            resolved_at: None,
            last_attempt_at: None,
        }
    }

    #[test]
    fn test_parse_choices() {
        let parsed = parse_choices("  Podcast \n\nInstagram\r\nPodcast\n   \n").unwrap();
        assert_eq!(parsed, ["Podcast", "Instagram"]);
        assert!(parse_choices("").unwrap().is_empty());

        let long = "x".repeat(MAX_CHOICE_LENGTH + 1);
        assert!(matches!(parse_choices(&long), Err(AppError::BadRequest(_))));
        assert!(parse_choices(&"x".repeat(MAX_CHOICE_LENGTH)).is_ok());
    }

    #[test]
    fn test_label_counts() {
        let orders = vec![
            record(1, Some("Podcast")),
            record(2, Some("Did not answer")),
            record(3, Some("Podcast")),
            record(4, None),
            record(5, Some("Instagram")),
        ];
        let counts = label_counts(&orders);
        assert_eq!(
            counts,
            vec![
                LabelCount { label: "Podcast".to_string(), count: 2 },
                LabelCount { label: "Did not answer".to_string(), count: 1 },
                LabelCount { label: "Instagram".to_string(), count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_record_choice_rejects_blank_label() {
        let service = AttributionService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FakeShopify::new()),
        );
        let err = service
            .record_choice(&shop(), CustomerId::new(1), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_remove_choice_without_list_is_not_found() {
        let service = AttributionService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FakeShopify::new()),
        );
        let account = Account::new(shop(), Utc::now());
        let err = service.remove_choice(&account, "Other").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_report_limit_is_clamped() {
        let store = Arc::new(MemoryStore::new());
        let service = AttributionService::new(store, Arc::new(FakeShopify::new()));
        let report = service.orders_report(&shop(), Some(0)).await.unwrap();
        assert!(report.orders.is_empty());
        assert!(report.counts.is_empty());
    }
}
