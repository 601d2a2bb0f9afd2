//! Customer selection model.

use chrono::{DateTime, Utc};
use howheard_core::{CustomerId, MetafieldId, ShopDomain};
use serde::Serialize;

/// The label a customer picked, and the metafield it was written to once
/// their first order was confirmed.
///
/// At most one per `(shop, customer_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerSelection {
    pub shop: ShopDomain,
    pub customer_id: CustomerId,
    pub label: String,
    pub metafield_id: Option<MetafieldId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomerSelection {
    /// Whether the label has been written back to the platform.
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        self.metafield_id.is_some()
    }
}
