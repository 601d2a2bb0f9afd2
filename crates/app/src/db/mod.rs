//! Persistence for accounts, choice lists, selections and order records.
//!
//! # Tables
//!
//! - `accounts` - One row per shop; credentials, profile and billing state
//! - `attribution_choice_lists` - Ordered survey labels per shop
//! - `customer_selections` - The label each customer picked
//! - `order_records` - Snapshot of every received order, unique per
//!   `(shop, order_number)`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/app/migrations/` and run via:
//! ```bash
//! cargo run -p howheard-cli -- migrate
//! ```

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use howheard_core::{BillingStatus, ChargeId, CustomerId, MetafieldId, OrderId, ShopDomain, WebhookId};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Account, AccountProfile, AttributionChoiceList, BillingActivation, CustomerSelection,
    NewOrderRecord, OrderRecord,
};

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryStore;
pub use postgres::PgAccountStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Storage port for everything the app persists.
///
/// Every write is a single statement, so each call is atomic on its own.
/// Updates to an account that does not exist return
/// [`RepositoryError::NotFound`].
#[async_trait]
pub trait AccountStore: Send + Sync {
    // ---- accounts ----------------------------------------------------------

    async fn find_account(&self, shop: &ShopDomain) -> Result<Option<Account>, RepositoryError>;

    /// Return the account for `shop`, creating it if absent.
    ///
    /// Concurrent calls for the same shop create exactly one row.
    async fn find_or_create_account(&self, shop: &ShopDomain) -> Result<Account, RepositoryError>;

    async fn save_token(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        scopes: &[String],
    ) -> Result<(), RepositoryError>;

    async fn save_profile(
        &self,
        shop: &ShopDomain,
        profile: &AccountProfile,
    ) -> Result<(), RepositoryError>;

    async fn save_webhooks(
        &self,
        shop: &ShopDomain,
        orders: WebhookId,
        uninstall: WebhookId,
    ) -> Result<(), RepositoryError>;

    /// Record a newly created charge and reset billing to `pending`.
    async fn save_pending_charge(
        &self,
        shop: &ShopDomain,
        charge_id: ChargeId,
        created_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn update_billing_status(
        &self,
        shop: &ShopDomain,
        status: BillingStatus,
    ) -> Result<(), RepositoryError>;

    /// Mark billing `activated` with its kind and dates.
    async fn save_activation(
        &self,
        shop: &ShopDomain,
        activation: &BillingActivation,
    ) -> Result<(), RepositoryError>;

    /// Clear credentials, billing and webhook state after an uninstall.
    ///
    /// The row and its order history are kept.
    async fn clear_installation(&self, shop: &ShopDomain) -> Result<(), RepositoryError>;

    async fn link_choice_list(&self, shop: &ShopDomain, list_id: Uuid)
    -> Result<(), RepositoryError>;

    // ---- choice lists ------------------------------------------------------

    async fn find_choice_list(
        &self,
        shop: &ShopDomain,
    ) -> Result<Option<AttributionChoiceList>, RepositoryError>;

    /// Create the shop's list. Returns `None` if one already exists.
    async fn create_choice_list(
        &self,
        shop: &ShopDomain,
        choices: &[String],
    ) -> Result<Option<AttributionChoiceList>, RepositoryError>;

    /// Append each label not already present, keeping existing order.
    async fn add_choices(
        &self,
        shop: &ShopDomain,
        choices: &[String],
    ) -> Result<AttributionChoiceList, RepositoryError>;

    /// Remove a label. Removing an absent label is a no-op.
    async fn remove_choice(
        &self,
        shop: &ShopDomain,
        label: &str,
    ) -> Result<AttributionChoiceList, RepositoryError>;

    // ---- customer selections ----------------------------------------------

    async fn find_selection(
        &self,
        shop: &ShopDomain,
        customer_id: CustomerId,
    ) -> Result<Option<CustomerSelection>, RepositoryError>;

    /// Create the selection, or overwrite the label of an existing one.
    async fn upsert_selection_label(
        &self,
        shop: &ShopDomain,
        customer_id: CustomerId,
        label: &str,
    ) -> Result<CustomerSelection, RepositoryError>;

    /// Record the confirmation metafield.
    ///
    /// Creates the selection with `label` if none exists; an existing
    /// selection keeps its label and only gains the metafield ID.
    async fn attach_confirmation(
        &self,
        shop: &ShopDomain,
        customer_id: CustomerId,
        label: &str,
        metafield_id: MetafieldId,
    ) -> Result<CustomerSelection, RepositoryError>;

    // ---- order records -----------------------------------------------------

    async fn find_order(
        &self,
        shop: &ShopDomain,
        order_number: i64,
    ) -> Result<Option<OrderRecord>, RepositoryError>;

    /// Insert an order record. Returns `false` if `(shop, order_number)`
    /// was already stored.
    async fn insert_order(&self, record: &NewOrderRecord) -> Result<bool, RepositoryError>;

    /// Mark a `pending` order `resolved` with `label`.
    ///
    /// Returns `false` if the order was not pending (already resolved by a
    /// concurrent delivery or the reconciler).
    async fn resolve_order(
        &self,
        shop: &ShopDomain,
        order_id: OrderId,
        label: &str,
    ) -> Result<bool, RepositoryError>;

    /// Stamp a failed reconciliation attempt on a `pending` order.
    async fn mark_reconcile_attempt(
        &self,
        shop: &ShopDomain,
        order_id: OrderId,
    ) -> Result<(), RepositoryError>;

    /// Most recent orders for a shop, newest first.
    async fn list_orders(
        &self,
        shop: &ShopDomain,
        limit: i64,
    ) -> Result<Vec<OrderRecord>, RepositoryError>;

    /// Pending orders received before `received_before`.
    ///
    /// Orders never retried come first, oldest received first; the rest
    /// follow by least recent attempt, so orders that keep failing cannot
    /// starve the batch.
    async fn list_pending_orders(
        &self,
        received_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OrderRecord>, RepositoryError>;

    // ---- health ------------------------------------------------------------

    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}
