//! Merchant account model.

use chrono::{DateTime, NaiveDate, Utc};
use howheard_core::{BillingKind, BillingStatus, ChargeId, ShopDomain, ShopId, WebhookId};
use secrecy::SecretString;
use uuid::Uuid;

use crate::shopify::ShopProfile;

/// A merchant's installation of the app, keyed by shop domain.
///
/// Created on first install and never deleted; an uninstall clears the
/// credentials and billing state but keeps the row (and its order history).
#[derive(Clone)]
pub struct Account {
    pub shop: ShopDomain,
    /// Offline access token. `None` until the OAuth grant completes and
    /// again after an uninstall.
    pub access_token: Option<SecretString>,
    pub scopes: Vec<String>,
    pub profile: AccountProfile,
    pub charge_id: Option<ChargeId>,
    pub charge_created_at: Option<DateTime<Utc>>,
    pub billing_status: BillingStatus,
    pub billing_kind: Option<BillingKind>,
    pub billing_activated_on: Option<NaiveDate>,
    pub trial_ends_on: Option<NaiveDate>,
    pub orders_webhook_id: Option<WebhookId>,
    pub uninstall_webhook_id: Option<WebhookId>,
    pub choice_list_id: Option<Uuid>,
    pub installed_at: DateTime<Utc>,
    pub uninstalled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("shop", &self.shop)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("billing_status", &self.billing_status)
            .field("billing_kind", &self.billing_kind)
            .field("charge_id", &self.charge_id)
            .field("choice_list_id", &self.choice_list_id)
            .finish_non_exhaustive()
    }
}

impl Account {
    /// A freshly installed account with nothing granted yet.
    #[must_use]
    pub fn new(shop: ShopDomain, now: DateTime<Utc>) -> Self {
        Self {
            shop,
            access_token: None,
            scopes: Vec::new(),
            profile: AccountProfile::default(),
            charge_id: None,
            charge_created_at: None,
            billing_status: BillingStatus::None,
            billing_kind: None,
            billing_activated_on: None,
            trial_ends_on: None,
            orders_webhook_id: None,
            uninstall_webhook_id: None,
            choice_list_id: None,
            installed_at: now,
            uninstalled_at: None,
            updated_at: now,
        }
    }

    /// Whether billing is active and the operational surface may serve it.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.billing_status.is_active()
    }
}

/// Shop details captured from the platform during authorization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountProfile {
    pub shopify_shop_id: Option<ShopId>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub iana_timezone: Option<String>,
    pub primary_locale: Option<String>,
    pub plan_name: Option<String>,
}

impl From<&ShopProfile> for AccountProfile {
    fn from(profile: &ShopProfile) -> Self {
        Self {
            shopify_shop_id: Some(profile.id),
            name: Some(profile.name.clone()),
            email: profile.email.clone(),
            iana_timezone: profile.iana_timezone.clone(),
            primary_locale: profile.primary_locale.clone(),
            plan_name: profile.plan_name.clone(),
        }
    }
}

/// Billing fields written when a charge is activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingActivation {
    pub kind: BillingKind,
    pub activated_on: NaiveDate,
    pub trial_ends_on: Option<NaiveDate>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_is_inactive() {
        let shop = ShopDomain::parse("cool-store.myshopify.com").unwrap();
        let account = Account::new(shop, Utc::now());
        assert_eq!(account.billing_status, BillingStatus::None);
        assert!(!account.is_active());
        assert!(account.access_token.is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let shop = ShopDomain::parse("cool-store.myshopify.com").unwrap();
        let mut account = Account::new(shop, Utc::now());
        account.access_token = Some(SecretString::from("shpat_live"));
        let debug = format!("{account:?}");
        assert!(!debug.contains("shpat_live"));
        assert!(debug.contains("[REDACTED]"));
    }
}
