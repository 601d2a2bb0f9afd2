//! Status enums for accounts and order records.

use serde::{Deserialize, Serialize};

/// Billing status of an account's recurring charge.
///
/// ```text
/// none ──authorize──▶ pending ──status check──▶ accepted ──activate──▶ activated
///                        │                         │                      │
///                        └──▶ declined / canceled ◀┘                      └──▶ canceled
/// ```
///
/// Any status may be reset to `none` by an uninstall, and a fresh OAuth grant
/// always starts a new charge (`pending`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "billing_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    /// No charge has been requested (fresh install or after uninstall).
    #[default]
    None,
    /// Charge created, waiting for the merchant to confirm it.
    Pending,
    /// Merchant accepted the charge; activation not yet completed.
    Accepted,
    /// Charge active. The only status that may serve the app.
    Activated,
    /// Merchant declined the charge.
    Declined,
    /// Charge was cancelled or expired on the platform.
    Canceled,
}

impl BillingStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::None,
        Self::Pending,
        Self::Accepted,
        Self::Activated,
        Self::Declined,
        Self::Canceled,
    ];

    /// Whether the account may use the operational surface and widgets.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Activated)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            // uninstall reset and new OAuth grants are always allowed
            (_, Self::None | Self::Pending) => true,
            (Self::Pending, Self::Accepted | Self::Declined | Self::Canceled)
            | (Self::Accepted, Self::Activated | Self::Declined | Self::Canceled)
            | (Self::Activated, Self::Canceled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for BillingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Activated => "activated",
            Self::Declined => "declined",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// What kind of billing an activated account is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "billing_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum BillingKind {
    /// Real charge, still inside the free trial.
    Trial,
    /// Real charge, past the trial.
    Paid,
    /// Test charge (development stores, partners, affiliates).
    Test,
}

impl std::fmt::Display for BillingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trial => write!(f, "trial"),
            Self::Paid => write!(f, "paid"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Where an order record is in the attribution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "attribution_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum AttributionStatus {
    /// First order; label not yet written back.
    Pending,
    /// Label resolved and written to the customer metafield.
    Resolved,
    /// Not eligible: repeat customer or guest checkout.
    Skipped,
}

impl std::fmt::Display for AttributionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Resolved => write!(f, "resolved"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}
