//! Request extractors shared by the route handlers.
//!
//! - [`ActiveAccount`] gates the merchant surface on billing status
//! - [`SignedWebhook`] verifies webhook bodies before any handler sees them

pub mod billing;
pub mod webhook;

pub use billing::{ActiveAccount, BillingRejection, error_redirect, shop_from_query};
pub use webhook::SignedWebhook;
