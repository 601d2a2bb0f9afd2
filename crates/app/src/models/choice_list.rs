//! Attribution choice list model.

use chrono::{DateTime, Utc};
use howheard_core::ShopDomain;
use serde::Serialize;
use uuid::Uuid;

/// The ordered labels a shop offers in its survey widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributionChoiceList {
    pub id: Uuid,
    pub shop: ShopDomain,
    pub choices: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttributionChoiceList {
    /// Whether `label` is one of the list's choices.
    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.choices.iter().any(|c| c == label)
    }
}
