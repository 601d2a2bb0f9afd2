//! howheard app library.
//!
//! The Shopify app server as a library, so the binary, the CLI and the
//! integration tests share one set of services.
//!
//! # Flow
//!
//! 1. A merchant installs: OAuth, profile fetch, webhook registration and a
//!    recurring charge
//! 2. The merchant accepts the charge and billing activates
//! 3. Storefront customers answer "how did you hear about us?" through the
//!    widget API
//! 4. `orders/create` webhooks for first-time customers are matched to the
//!    stored answer and the label is written back as a customer metafield
//!
//! # Security
//!
//! Holds offline Admin API tokens for every installed shop. Webhooks and
//! OAuth callbacks are HMAC-verified against the app secret.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod shopify;
pub mod state;
