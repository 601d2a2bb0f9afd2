//! Core types for howheard.
//!
//! This module provides type-safe wrappers for the concepts shared between
//! the app server and the CLI.

pub mod attribution;
pub mod email;
pub mod id;
pub mod shop;
pub mod status;

pub use attribution::{DID_NOT_ANSWER, FALLBACK_CHOICES, MAX_CHOICE_LENGTH, with_fallbacks};
pub use email::{Email, EmailError};
pub use id::*;
pub use shop::{ShopDomain, ShopDomainError};
pub use status::*;
