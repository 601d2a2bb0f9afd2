//! Domain models for merchant accounts and attribution data.

pub mod account;
pub mod choice_list;
pub mod order;
pub mod selection;

pub use account::{Account, AccountProfile, BillingActivation};
pub use choice_list::AttributionChoiceList;
pub use order::{CustomerSnapshot, NewOrderRecord, OrderRecord};
pub use selection::CustomerSelection;
