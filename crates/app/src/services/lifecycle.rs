//! Account lifecycle: install, authorize, bill, operate, uninstall.
//!
//! ```text
//! Uninstalled ─install─▶ Installed ─authorize─▶ ChargePending ─activate─▶ Activated
//!      ▲                                              │
//!      └─────────────── uninstall (from any) ─────────┴──▶ Declined
//! ```
//!
//! Every step writes keyed fields on the account, so a merchant reloading a
//! failed step re-runs it safely. Nothing here retries on its own.

use std::sync::Arc;

use chrono::Utc;
use howheard_core::{BillingKind, BillingStatus, Email, ShopDomain};
use secrecy::SecretString;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::{AppConfig, BillingConfig};
use crate::db::AccountStore;
use crate::error::AppError;
use crate::models::{Account, AccountProfile, BillingActivation};
use crate::shopify::{
    ChargeStatus, CommercePlatform, RecurringCharge, RecurringChargeRequest, ShopProfile,
    WebhookTopic, oauth,
};

/// Result of the billing-accept callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// Charge activated; the merchant may use the app.
    Activated(BillingKind),
    /// The platform did not report the charge as accepted.
    Halted {
        charge_status: ChargeStatus,
        billing_status: BillingStatus,
    },
}

/// Drives accounts through the install/billing state machine.
pub struct LifecycleService {
    store: Arc<dyn AccountStore>,
    platform: Arc<dyn CommercePlatform>,
    base_url: String,
    api_key: String,
    scopes: Vec<String>,
    billing: BillingConfig,
}

impl LifecycleService {
    /// Create a new lifecycle service.
    #[must_use]
    pub fn new(
        store: Arc<dyn AccountStore>,
        platform: Arc<dyn CommercePlatform>,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            platform,
            base_url: config.base_url.clone(),
            api_key: config.shopify.api_key.clone(),
            scopes: config.shopify.scopes.clone(),
            billing: config.billing.clone(),
        }
    }

    /// Handle an install request.
    ///
    /// Creates the account if needed and returns the platform authorization
    /// URL to redirect the merchant to. The nonce in the URL is not stored.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the account cannot be created.
    #[instrument(skip(self), fields(shop = %shop))]
    pub async fn install(&self, shop: &ShopDomain) -> Result<String, AppError> {
        self.store.find_or_create_account(shop).await?;

        let nonce = Uuid::new_v4().simple().to_string();
        let redirect_uri = format!("{}/auth/callback", self.base_url);
        Ok(oauth::authorization_url(
            shop,
            &self.api_key,
            &self.scopes,
            &redirect_uri,
            &nonce,
        ))
    }

    /// Handle the OAuth callback.
    ///
    /// Exchanges the code, stores the token and profile, registers webhooks
    /// and creates the recurring charge. Returns the charge confirmation URL.
    /// Billing always restarts at `pending`, even for a previously activated
    /// account.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ExternalCallFailed` if any platform call fails and
    /// `AppError::Database` if a write fails. Earlier steps are not rolled back.
    #[instrument(skip(self, code), fields(shop = %shop))]
    pub async fn authorize(&self, shop: &ShopDomain, code: &str) -> Result<String, AppError> {
        let token = self.platform.exchange_code(shop, code).await?;
        self.store.find_or_create_account(shop).await?;
        self.store
            .save_token(shop, &token.token, &token.scopes)
            .await?;

        let profile = self.platform.shop_profile(shop, &token.token).await?;
        self.store
            .save_profile(shop, &AccountProfile::from(&profile))
            .await?;

        let orders_hook = self
            .platform
            .register_webhook(
                shop,
                &token.token,
                WebhookTopic::OrdersCreate,
                &format!("{}/webhooks/orders/create/{shop}", self.base_url),
            )
            .await?;
        let uninstall_hook = self
            .platform
            .register_webhook(
                shop,
                &token.token,
                WebhookTopic::AppUninstalled,
                &format!("{}/webhooks/app/uninstalled", self.base_url),
            )
            .await?;
        self.store
            .save_webhooks(shop, orders_hook, uninstall_hook)
            .await?;

        let test = is_test_charge(&self.billing, &profile);
        let charge = self
            .create_charge(shop, &token.token, test)
            .await?;
        self.store
            .save_pending_charge(shop, charge.id, charge.created_at.unwrap_or_else(Utc::now))
            .await?;

        info!(charge_id = %charge.id, test, "Created recurring charge");

        charge
            .confirmation_url
            .ok_or_else(|| AppError::Internal("charge has no confirmation URL".to_string()))
    }

    async fn create_charge(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        test: bool,
    ) -> Result<RecurringCharge, AppError> {
        let request = RecurringChargeRequest {
            name: self.billing.plan_name.clone(),
            price: self.billing.price,
            return_url: format!("{}/billing/activate?shop={shop}", self.base_url),
            trial_days: self.billing.trial_days,
            test: test.then_some(true),
        };
        Ok(self
            .platform
            .create_recurring_charge(shop, token, &request)
            .await?)
    }

    /// Handle the merchant's return from the charge confirmation page.
    ///
    /// Only an `accepted` charge is activated, and only while billing may
    /// still move to `accepted`. `declined` moves billing to
    /// `declined`, `cancelled`/`expired` to `canceled`; any other status
    /// leaves billing untouched. A charge the platform already reports as
    /// `active` is recorded without another activation call.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the account or its charge is missing,
    /// `AppError::Unauthorized` if the account has no token, and
    /// `AppError::ExternalCallFailed` if a platform call fails.
    #[instrument(skip(self), fields(shop = %shop))]
    pub async fn activate(&self, shop: &ShopDomain) -> Result<ActivationOutcome, AppError> {
        let account = self.account(shop).await?;
        let token = account_token(&account)?;
        let charge_id = account
            .charge_id
            .ok_or_else(|| AppError::NotFound(format!("no charge for {shop}")))?;

        let charge = self
            .platform
            .recurring_charge(shop, token, charge_id)
            .await?;

        let activated = match charge.status {
            ChargeStatus::Accepted => {
                let billing_status = self.transition(&account, BillingStatus::Accepted).await?;
                if billing_status != BillingStatus::Accepted {
                    warn!(%billing_status, "Accepted charge for account that cannot accept it");
                    return Ok(ActivationOutcome::Halted {
                        charge_status: ChargeStatus::Accepted,
                        billing_status,
                    });
                }
                self.platform
                    .activate_recurring_charge(shop, token, &charge)
                    .await?
            }
            ChargeStatus::Active => charge,
            status => {
                let next = match status {
                    ChargeStatus::Declined => Some(BillingStatus::Declined),
                    ChargeStatus::Cancelled | ChargeStatus::Expired => Some(BillingStatus::Canceled),
                    _ => None,
                };
                let billing_status = match next {
                    Some(next) => self.transition(&account, next).await?,
                    None => account.billing_status,
                };
                warn!(charge_status = %status, %billing_status, "Charge not accepted");
                return Ok(ActivationOutcome::Halted {
                    charge_status: status,
                    billing_status,
                });
            }
        };

        let kind = billing_kind(&activated);
        let activation = BillingActivation {
            kind,
            activated_on: activated
                .activated_on
                .unwrap_or_else(|| Utc::now().date_naive()),
            trial_ends_on: activated.trial_ends_on,
        };
        self.store.save_activation(shop, &activation).await?;

        info!(%kind, "Billing activated");
        Ok(ActivationOutcome::Activated(kind))
    }

    /// Persist `next` if the state machine allows it. Returns the status the
    /// account ends up in.
    async fn transition(
        &self,
        account: &Account,
        next: BillingStatus,
    ) -> Result<BillingStatus, AppError> {
        if account.billing_status.can_transition_to(next) {
            self.store.update_billing_status(&account.shop, next).await?;
            Ok(next)
        } else {
            Ok(account.billing_status)
        }
    }

    /// Handle the `app/uninstalled` webhook.
    ///
    /// Clears the token, billing fields, webhook IDs and list link. The
    /// account row is kept. Repeated deliveries are harmless.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unresolvable` if the shop has no account.
    #[instrument(skip(self), fields(shop = %shop))]
    pub async fn uninstall(&self, shop: &ShopDomain) -> Result<(), AppError> {
        if self.store.find_account(shop).await?.is_none() {
            return Err(AppError::Unresolvable(format!("no account for {shop}")));
        }
        self.store.clear_installation(shop).await?;
        info!("Account uninstalled");
        Ok(())
    }

    /// Return the account if it may use the operational surface.
    ///
    /// `None` for unknown shops and for any billing status except `activated`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the lookup fails.
    pub async fn active_account(&self, shop: &ShopDomain) -> Result<Option<Account>, AppError> {
        Ok(self
            .store
            .find_account(shop)
            .await?
            .filter(Account::is_active))
    }

    async fn account(&self, shop: &ShopDomain) -> Result<Account, AppError> {
        self.store
            .find_account(shop)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("account {shop}")))
    }
}

/// The account's access token, or `Unauthorized` if it has none.
pub(crate) fn account_token(account: &Account) -> Result<&SecretString, AppError> {
    account
        .access_token
        .as_ref()
        .ok_or_else(|| AppError::Unauthorized(format!("{} has no access token", account.shop)))
}

/// Whether a new charge for this shop should be a test charge.
///
/// Any one of: global test mode, the shop contact email on a partner
/// domain, or an affiliate/development plan.
#[must_use]
pub fn is_test_charge(billing: &BillingConfig, profile: &ShopProfile) -> bool {
    if billing.test_mode {
        return true;
    }

    let partner = profile
        .email
        .as_deref()
        .and_then(|e| Email::parse(e).ok())
        .is_some_and(|e| e.domain_in(&billing.partner_domains));

    let affiliate = profile.plan_name.as_deref().is_some_and(|plan| {
        billing
            .affiliate_plans
            .iter()
            .any(|p| p.eq_ignore_ascii_case(plan.trim()))
    });

    partner || affiliate
}

/// Billing kind of an activated charge.
#[must_use]
pub fn billing_kind(charge: &RecurringCharge) -> BillingKind {
    if charge.is_test() {
        return BillingKind::Test;
    }
    match (charge.activated_on, charge.trial_ends_on) {
        (Some(activated), Some(trial_end)) if trial_end > activated => BillingKind::Trial,
        (None, Some(trial_end)) if trial_end > Utc::now().date_naive() => BillingKind::Trial,
        _ => BillingKind::Paid,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;
    use howheard_core::{ChargeId, ShopId};
    use rust_decimal::Decimal;

    use super::*;
    use crate::db::MemoryStore;
    use crate::shopify::fake::{Call, FakeShopify};

    fn profile(email: Option<&str>, plan: Option<&str>) -> ShopProfile {
        ShopProfile {
            id: ShopId::new(1),
            name: "Cool Store".to_string(),
            email: email.map(String::from),
            myshopify_domain: None,
            iana_timezone: None,
            primary_locale: None,
            plan_name: plan.map(String::from),
            currency: None,
        }
    }

    fn charge(test: Option<bool>, activated: Option<NaiveDate>, trial_end: Option<NaiveDate>) -> RecurringCharge {
        RecurringCharge {
            id: ChargeId::new(1),
            name: "How Heard Monthly".to_string(),
            price: Decimal::new(499, 2),
            status: ChargeStatus::Active,
            test,
            trial_days: Some(14),
            created_at: None,
            billing_on: None,
            activated_on: activated,
            trial_ends_on: trial_end,
            return_url: None,
            confirmation_url: None,
        }
    }

    fn date(day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, 3, day)
    }

    fn shop() -> ShopDomain {
        ShopDomain::parse("cool-store.myshopify.com").unwrap()
    }

    fn service(store: Arc<MemoryStore>, platform: Arc<FakeShopify>) -> LifecycleService {
        LifecycleService::new(store, platform, &AppConfig::for_tests())
    }

    #[test]
    fn test_charge_rules() {
        let billing = BillingConfig {
            partner_domains: vec!["partners.example".to_string()],
            ..BillingConfig::default()
        };

        assert!(!is_test_charge(&billing, &profile(Some("owner@shop.example"), Some("basic"))));
        assert!(is_test_charge(&billing, &profile(Some("dev@Partners.Example"), Some("basic"))));
        assert!(is_test_charge(&billing, &profile(None, Some("affiliate"))));
        assert!(is_test_charge(&billing, &profile(None, Some("Partner_Test"))));
        assert!(!is_test_charge(&billing, &profile(Some("not-an-email"), None)));

        let test_mode = BillingConfig {
            test_mode: true,
            ..BillingConfig::default()
        };
        assert!(is_test_charge(&test_mode, &profile(None, None)));
    }

    #[test]
    fn test_billing_kind() {
        assert_eq!(billing_kind(&charge(Some(true), date(1), date(15))), BillingKind::Test);
        assert_eq!(billing_kind(&charge(None, date(1), date(15))), BillingKind::Trial);
        assert_eq!(billing_kind(&charge(Some(false), date(1), date(1))), BillingKind::Paid);
        assert_eq!(billing_kind(&charge(None, date(1), None)), BillingKind::Paid);
    }

    #[tokio::test]
    async fn test_install_creates_account_and_builds_url() {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(FakeShopify::new());
        let service = service(store.clone(), platform.clone());

        let url = service.install(&shop()).await.unwrap();
        assert!(url.starts_with("https://cool-store.myshopify.com/admin/oauth/authorize?client_id="));
        assert!(url.contains("&state="));
        assert!(store.find_account(&shop()).await.unwrap().is_some());
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_authorize_then_activate() {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(FakeShopify::new());
        let service = service(store.clone(), platform.clone());

        service.install(&shop()).await.unwrap();
        let confirmation = service.authorize(&shop(), "code-1").await.unwrap();
        assert!(confirmation.contains("confirm_recurring_application_charge"));

        let account = store.find_account(&shop()).await.unwrap().unwrap();
        assert_eq!(account.billing_status, BillingStatus::Pending);
        assert!(account.access_token.is_some());
        assert!(account.orders_webhook_id.is_some());
        assert!(account.uninstall_webhook_id.is_some());
        assert!(account.charge_id.is_some());
        assert!(platform.calls().contains(&Call::CreateCharge {
            shop: shop().to_string(),
            test: false,
        }));

        let outcome = service.activate(&shop()).await.unwrap();
        assert_eq!(outcome, ActivationOutcome::Activated(BillingKind::Trial));

        let account = store.find_account(&shop()).await.unwrap().unwrap();
        assert_eq!(account.billing_status, BillingStatus::Activated);
        assert_eq!(account.billing_kind, Some(BillingKind::Trial));
        assert!(account.trial_ends_on.is_some());
        assert!(service.active_account(&shop()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_activation_call_leaves_accepted() {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(FakeShopify::new());
        let service = service(store.clone(), platform.clone());

        service.authorize(&shop(), "code-1").await.unwrap();
        platform.fail_activation(true);

        let err = service.activate(&shop()).await.unwrap_err();
        assert!(matches!(err, AppError::ExternalCallFailed(_)));

        let account = store.find_account(&shop()).await.unwrap().unwrap();
        assert_eq!(account.billing_status, BillingStatus::Accepted);
        assert!(service.active_account(&shop()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activation_retry_after_failed_call() {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(FakeShopify::new());
        let service = service(store.clone(), platform.clone());

        service.authorize(&shop(), "code-1").await.unwrap();
        platform.fail_activation(true);
        service.activate(&shop()).await.unwrap_err();
        platform.fail_activation(false);

        let outcome = service.activate(&shop()).await.unwrap();
        assert!(matches!(outcome, ActivationOutcome::Activated(_)));
    }

    #[tokio::test]
    async fn test_declined_account_is_not_activated() {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(FakeShopify::new());
        let service = service(store.clone(), platform.clone());

        service.authorize(&shop(), "code-1").await.unwrap();
        store
            .update_billing_status(&shop(), BillingStatus::Declined)
            .await
            .unwrap();

        let outcome = service.activate(&shop()).await.unwrap();
        assert_eq!(
            outcome,
            ActivationOutcome::Halted {
                charge_status: ChargeStatus::Accepted,
                billing_status: BillingStatus::Declined,
            }
        );
        assert_eq!(platform.activation_count(), 0);

        let account = store.find_account(&shop()).await.unwrap().unwrap();
        assert_eq!(account.billing_status, BillingStatus::Declined);
        assert!(account.billing_kind.is_none());
    }

    #[tokio::test]
    async fn test_activate_without_charge_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(FakeShopify::new());
        let service = service(store.clone(), platform);

        store.find_or_create_account(&shop()).await.unwrap();
        store
            .save_token(&shop(), &SecretString::from("shpat_x"), &[])
            .await
            .unwrap();

        let err = service.activate(&shop()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_uninstall_unknown_shop_is_unresolvable() {
        let service = service(Arc::new(MemoryStore::new()), Arc::new(FakeShopify::new()));
        let err = service.uninstall(&shop()).await.unwrap_err();
        assert!(matches!(err, AppError::Unresolvable(_)));
    }
}
