//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! hh-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `HOWHEARD_DATABASE_URL` - `PostgreSQL` connection string (falls back
//!   to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! Migrations live in `crates/app/migrations/` and are embedded at compile
//! time:
//! ```text
//! migrations/
//! ├── 20240301000000_create_accounts.sql
//! └── 20240301000001_create_attribution.sql
//! ```

use howheard_app::config::{ConfigError, database_url_from_env};
use thiserror::Error;

/// Errors from running migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run the app database migrations.
///
/// # Errors
///
/// Returns an error if no database URL is configured, the database is
/// unreachable, or a migration fails.
pub async fn run() -> Result<(), MigrationError> {
    let database_url = database_url_from_env()?;

    tracing::info!("Connecting to database...");
    let pool = howheard_app::db::create_pool(&database_url).await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../app/migrations").run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
