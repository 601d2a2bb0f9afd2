//! In-process [`CommercePlatform`] that records every call.
//!
//! Used by unit and integration tests in place of the HTTP client.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{Days, Utc};
use howheard_core::{
    ChargeId, CustomerId, Email, MetafieldId, ShopDomain, ShopId, WebhookId,
};
use secrecy::SecretString;

use super::types::{
    AccessToken, ChargeStatus, CustomerSummary, Metafield, MetafieldInput, RecurringCharge,
    RecurringChargeRequest, ShopProfile, WebhookTopic,
};
use super::{CommercePlatform, ShopifyError};

/// A recorded outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ExchangeCode { shop: String },
    ShopProfile { shop: String },
    RegisterWebhook { shop: String, topic: WebhookTopic, address: String },
    CreateCharge { shop: String, test: bool },
    FetchCharge { shop: String, charge_id: ChargeId },
    ActivateCharge { shop: String, charge_id: ChargeId },
    SearchCustomer { shop: String, email: String },
    CreateMetafield { shop: String, customer_id: CustomerId, value: String },
}

#[derive(Debug)]
struct FakeState {
    calls: Vec<Call>,
    shop_email: Option<String>,
    plan_name: Option<String>,
    charge_status: ChargeStatus,
    charge_test: Option<bool>,
    charges: HashMap<ChargeId, RecurringCharge>,
    customers: HashMap<String, CustomerId>,
    webhooks: HashMap<(WebhookTopic, String), WebhookId>,
    fail_metafields: bool,
    fail_activation: bool,
    next_id: i64,
}

/// Recording fake of the Shopify Admin API.
#[derive(Debug)]
pub struct FakeShopify {
    state: Mutex<FakeState>,
}

impl Default for FakeShopify {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeShopify {
    /// A fake whose charges come back `accepted` and non-test.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                calls: Vec::new(),
                shop_email: Some("owner@cool-store.example".to_string()),
                plan_name: Some("basic".to_string()),
                charge_status: ChargeStatus::Accepted,
                charge_test: None,
                charges: HashMap::new(),
                customers: HashMap::new(),
                webhooks: HashMap::new(),
                fail_metafields: false,
                fail_activation: false,
                next_id: 1000,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Contact email reported by `shop_profile`.
    pub fn set_shop_email(&self, email: Option<&str>) {
        self.lock().shop_email = email.map(String::from);
    }

    /// Plan name reported by `shop_profile`.
    pub fn set_plan_name(&self, plan_name: Option<&str>) {
        self.lock().plan_name = plan_name.map(String::from);
    }

    /// Status reported when a charge is fetched.
    pub fn set_charge_status(&self, status: ChargeStatus) {
        self.lock().charge_status = status;
    }

    /// Override the platform's `test` flag on fetched and activated charges.
    pub fn set_charge_test(&self, test: Option<bool>) {
        self.lock().charge_test = test;
    }

    /// Register a customer findable by email search.
    pub fn add_customer(&self, email: &str, id: CustomerId) {
        self.lock().customers.insert(email.to_ascii_lowercase(), id);
    }

    /// Make metafield writes fail with a 500.
    pub fn fail_metafields(&self, fail: bool) {
        self.lock().fail_metafields = fail;
    }

    /// Make charge activation fail with a 500.
    pub fn fail_activation(&self, fail: bool) {
        self.lock().fail_activation = fail;
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// `(customer, label)` for every metafield write attempted.
    #[must_use]
    pub fn metafield_writes(&self) -> Vec<(CustomerId, String)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::CreateMetafield {
                    customer_id, value, ..
                } => Some((*customer_id, value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of activation calls made.
    #[must_use]
    pub fn activation_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::ActivateCharge { .. }))
            .count()
    }

    fn record(&self, call: Call) -> MutexGuard<'_, FakeState> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }
}

fn server_error() -> ShopifyError {
    ShopifyError::Api {
        status: 500,
        body: r#"{"errors":"Internal Server Error"}"#.to_string(),
    }
}

fn not_found() -> ShopifyError {
    ShopifyError::Api {
        status: 404,
        body: r#"{"errors":"Not Found"}"#.to_string(),
    }
}

#[async_trait]
impl CommercePlatform for FakeShopify {
    async fn exchange_code(
        &self,
        shop: &ShopDomain,
        code: &str,
    ) -> Result<AccessToken, ShopifyError> {
        drop(self.record(Call::ExchangeCode {
            shop: shop.to_string(),
        }));
        if code.is_empty() {
            return Err(ShopifyError::Unauthorized("invalid code".to_string()));
        }
        Ok(AccessToken {
            token: SecretString::from(format!("shpat_{code}")),
            scopes: vec!["read_orders".to_string(), "write_customers".to_string()],
        })
    }

    async fn shop_profile(
        &self,
        shop: &ShopDomain,
        _token: &SecretString,
    ) -> Result<ShopProfile, ShopifyError> {
        let state = self.record(Call::ShopProfile {
            shop: shop.to_string(),
        });
        Ok(ShopProfile {
            id: ShopId::new(548_380_009),
            name: shop.handle().to_string(),
            email: state.shop_email.clone(),
            myshopify_domain: Some(shop.to_string()),
            iana_timezone: Some("America/New_York".to_string()),
            primary_locale: Some("en".to_string()),
            plan_name: state.plan_name.clone(),
            currency: Some("USD".to_string()),
        })
    }

    async fn register_webhook(
        &self,
        shop: &ShopDomain,
        _token: &SecretString,
        topic: WebhookTopic,
        address: &str,
    ) -> Result<WebhookId, ShopifyError> {
        let mut state = self.record(Call::RegisterWebhook {
            shop: shop.to_string(),
            topic,
            address: address.to_string(),
        });
        state.next_id += 1;
        let fresh = WebhookId::new(state.next_id);
        Ok(*state
            .webhooks
            .entry((topic, address.to_string()))
            .or_insert(fresh))
    }

    async fn create_recurring_charge(
        &self,
        shop: &ShopDomain,
        _token: &SecretString,
        request: &RecurringChargeRequest,
    ) -> Result<RecurringCharge, ShopifyError> {
        let mut state = self.record(Call::CreateCharge {
            shop: shop.to_string(),
            test: request.test.unwrap_or(false),
        });
        state.next_id += 1;
        let id = ChargeId::new(state.next_id);
        let charge = RecurringCharge {
            id,
            name: request.name.clone(),
            price: request.price,
            status: ChargeStatus::Pending,
            test: request.test,
            trial_days: Some(request.trial_days),
            created_at: Some(Utc::now()),
            billing_on: None,
            activated_on: None,
            trial_ends_on: None,
            return_url: Some(request.return_url.clone()),
            confirmation_url: Some(format!(
                "https://{shop}/admin/charges/{id}/confirm_recurring_application_charge"
            )),
        };
        state.charges.insert(id, charge.clone());
        Ok(charge)
    }

    async fn recurring_charge(
        &self,
        shop: &ShopDomain,
        _token: &SecretString,
        charge_id: ChargeId,
    ) -> Result<RecurringCharge, ShopifyError> {
        let state = self.record(Call::FetchCharge {
            shop: shop.to_string(),
            charge_id,
        });
        let mut charge = state.charges.get(&charge_id).cloned().ok_or_else(not_found)?;
        charge.status = state.charge_status;
        if state.charge_test.is_some() {
            charge.test = state.charge_test;
        }
        Ok(charge)
    }

    async fn activate_recurring_charge(
        &self,
        shop: &ShopDomain,
        _token: &SecretString,
        charge: &RecurringCharge,
    ) -> Result<RecurringCharge, ShopifyError> {
        let state = self.record(Call::ActivateCharge {
            shop: shop.to_string(),
            charge_id: charge.id,
        });
        if state.fail_activation {
            return Err(server_error());
        }

        let today = Utc::now().date_naive();
        let trial_days = charge.trial_days.unwrap_or(0);
        let mut activated = charge.clone();
        activated.status = ChargeStatus::Active;
        activated.activated_on = Some(today);
        activated.trial_ends_on = (trial_days > 0)
            .then(|| today.checked_add_days(Days::new(u64::from(trial_days))))
            .flatten();
        activated.billing_on = activated.trial_ends_on.or(Some(today));
        if state.charge_test.is_some() {
            activated.test = state.charge_test;
        }
        Ok(activated)
    }

    async fn search_customer_by_email(
        &self,
        shop: &ShopDomain,
        _token: &SecretString,
        email: &Email,
    ) -> Result<Option<CustomerSummary>, ShopifyError> {
        let state = self.record(Call::SearchCustomer {
            shop: shop.to_string(),
            email: email.to_string(),
        });
        let key = email.as_str().to_ascii_lowercase();
        Ok(state.customers.get(&key).map(|id| CustomerSummary {
            id: *id,
            email: Some(email.to_string()),
            first_name: None,
            last_name: None,
            orders_count: Some(0),
        }))
    }

    async fn create_customer_metafield(
        &self,
        shop: &ShopDomain,
        _token: &SecretString,
        customer_id: CustomerId,
        metafield: &MetafieldInput,
    ) -> Result<Metafield, ShopifyError> {
        let mut state = self.record(Call::CreateMetafield {
            shop: shop.to_string(),
            customer_id,
            value: metafield.value.clone(),
        });
        if state.fail_metafields {
            return Err(server_error());
        }
        state.next_id += 1;
        Ok(Metafield {
            id: MetafieldId::new(state.next_id),
            namespace: metafield.namespace.clone(),
            key: metafield.key.clone(),
            value: metafield.value.clone(),
        })
    }
}
