//! Retry attribution for orders whose metafield write never landed.
//!
//! An order stays `pending` when the customer had no selection yet or when
//! Shopify rejected the write. This sweep picks those up.
//!
//! # Usage
//!
//! ```bash
//! # Orders received at least an hour ago
//! hh-cli reconcile
//!
//! # Tighter window, e.g. from a cron every 5 minutes
//! hh-cli reconcile --min-age-minutes 10
//! ```

use std::sync::Arc;

use howheard_app::config::{AppConfig, ConfigError};
use howheard_app::db::{self, PgAccountStore};
use howheard_app::error::AppError;
use howheard_app::services::AttributionService;
use howheard_app::shopify::{ShopifyClient, ShopifyError};
use thiserror::Error;

/// Errors from a reconciliation run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Shopify client error: {0}")]
    Shopify(#[from] ShopifyError),

    #[error(transparent)]
    App(#[from] AppError),
}

/// Resolve pending orders older than `min_age_minutes`.
///
/// # Errors
///
/// Returns an error if configuration is incomplete or pending orders
/// cannot be listed. Failures on individual orders are counted, not raised.
pub async fn run(min_age_minutes: i64) -> Result<(), ReconcileError> {
    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    let store = Arc::new(PgAccountStore::new(pool));
    let shopify = Arc::new(ShopifyClient::new(&config.shopify)?);
    let attribution = AttributionService::new(store, shopify);

    let summary = attribution
        .reconcile_pending(chrono::Duration::minutes(min_age_minutes))
        .await?;

    tracing::info!(
        examined = summary.examined,
        resolved = summary.resolved,
        failed = summary.failed,
        "Reconciliation complete"
    );
    Ok(())
}
