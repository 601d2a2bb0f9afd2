//! Business logic services.
//!
//! # Services
//!
//! - `lifecycle` - Install, OAuth, recurring billing and uninstall
//! - `attribution` - Order webhook correlation, choice lists and reporting

pub mod attribution;
pub mod lifecycle;

pub use attribution::{
    AttributionService, IngestOutcome, LabelCount, OrdersReport, ReconcileSummary, parse_choices,
};
pub use lifecycle::{ActivationOutcome, LifecycleService, billing_kind, is_test_charge};
