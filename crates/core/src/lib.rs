//! howheard core - Shared domain types.
//!
//! This crate provides the types shared by every howheard component:
//! - `app` - Shopify app server (install, billing, webhooks, widget API)
//! - `cli` - Command-line tools for migrations and reconciliation
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Shop domains, platform IDs, emails, billing and attribution statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
