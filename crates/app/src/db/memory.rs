//! In-memory [`AccountStore`] for tests.
//!
//! A single `RwLock` guards all tables, so every method is atomic the same
//! way a single SQL statement is.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use howheard_core::{
    AttributionStatus, BillingStatus, ChargeId, CustomerId, MetafieldId, OrderId, ShopDomain,
    WebhookId,
};
use secrecy::SecretString;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AccountStore, RepositoryError};
use crate::models::{
    Account, AccountProfile, AttributionChoiceList, BillingActivation, CustomerSelection,
    NewOrderRecord, OrderRecord,
};

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<ShopDomain, Account>,
    choice_lists: HashMap<ShopDomain, AttributionChoiceList>,
    selections: HashMap<(ShopDomain, CustomerId), CustomerSelection>,
    orders: HashMap<(ShopDomain, i64), OrderRecord>,
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    miss_order_lookups: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored order records for a shop.
    pub async fn order_count(&self, shop: &ShopDomain) -> usize {
        self.tables
            .read()
            .await
            .orders
            .keys()
            .filter(|(s, _)| s == shop)
            .count()
    }

    /// Overwrite an account's billing status directly.
    pub async fn force_billing_status(&self, shop: &ShopDomain, status: BillingStatus) {
        if let Some(account) = self.tables.write().await.accounts.get_mut(shop) {
            account.billing_status = status;
        }
    }

    /// Make `find_order` report nothing, so duplicates are only caught by
    /// `insert_order`, as when two deliveries race past the lookup.
    pub fn miss_order_lookups(&self, miss: bool) {
        self.miss_order_lookups.store(miss, Ordering::SeqCst);
    }

    /// Shift an order's `received_at` into the past.
    pub async fn age_order(&self, shop: &ShopDomain, order_number: i64, by: chrono::Duration) {
        if let Some(order) = self
            .tables
            .write()
            .await
            .orders
            .get_mut(&(shop.clone(), order_number))
        {
            order.received_at -= by;
        }
    }
}

fn update_account(
    tables: &mut Tables,
    shop: &ShopDomain,
    f: impl FnOnce(&mut Account),
) -> Result<(), RepositoryError> {
    let account = tables
        .accounts
        .get_mut(shop)
        .ok_or(RepositoryError::NotFound)?;
    f(account);
    account.updated_at = Utc::now();
    Ok(())
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_account(&self, shop: &ShopDomain) -> Result<Option<Account>, RepositoryError> {
        Ok(self.tables.read().await.accounts.get(shop).cloned())
    }

    async fn find_or_create_account(&self, shop: &ShopDomain) -> Result<Account, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .accounts
            .entry(shop.clone())
            .or_insert_with(|| Account::new(shop.clone(), Utc::now()))
            .clone())
    }

    async fn save_token(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        scopes: &[String],
    ) -> Result<(), RepositoryError> {
        update_account(&mut *self.tables.write().await, shop, |a| {
            a.access_token = Some(token.clone());
            a.scopes = scopes.to_vec();
            a.uninstalled_at = None;
        })
    }

    async fn save_profile(
        &self,
        shop: &ShopDomain,
        profile: &AccountProfile,
    ) -> Result<(), RepositoryError> {
        update_account(&mut *self.tables.write().await, shop, |a| {
            a.profile = profile.clone();
            a.billing_status = BillingStatus::Pending;
            a.billing_kind = None;
            a.billing_activated_on = None;
            a.trial_ends_on = None;
        })
    }

    async fn save_webhooks(
        &self,
        shop: &ShopDomain,
        orders: WebhookId,
        uninstall: WebhookId,
    ) -> Result<(), RepositoryError> {
        update_account(&mut *self.tables.write().await, shop, |a| {
            a.orders_webhook_id = Some(orders);
            a.uninstall_webhook_id = Some(uninstall);
        })
    }

    async fn save_pending_charge(
        &self,
        shop: &ShopDomain,
        charge_id: ChargeId,
        created_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        update_account(&mut *self.tables.write().await, shop, |a| {
            a.charge_id = Some(charge_id);
            a.charge_created_at = Some(created_at);
            a.billing_status = BillingStatus::Pending;
        })
    }

    async fn update_billing_status(
        &self,
        shop: &ShopDomain,
        status: BillingStatus,
    ) -> Result<(), RepositoryError> {
        update_account(&mut *self.tables.write().await, shop, |a| {
            a.billing_status = status;
        })
    }

    async fn save_activation(
        &self,
        shop: &ShopDomain,
        activation: &BillingActivation,
    ) -> Result<(), RepositoryError> {
        update_account(&mut *self.tables.write().await, shop, |a| {
            a.billing_status = BillingStatus::Activated;
            a.billing_kind = Some(activation.kind);
            a.billing_activated_on = Some(activation.activated_on);
            a.trial_ends_on = activation.trial_ends_on;
        })
    }

    async fn clear_installation(&self, shop: &ShopDomain) -> Result<(), RepositoryError> {
        update_account(&mut *self.tables.write().await, shop, |a| {
            a.access_token = None;
            a.scopes.clear();
            a.charge_id = None;
            a.charge_created_at = None;
            a.billing_status = BillingStatus::None;
            a.billing_kind = None;
            a.billing_activated_on = None;
            a.trial_ends_on = None;
            a.orders_webhook_id = None;
            a.uninstall_webhook_id = None;
            a.choice_list_id = None;
            a.uninstalled_at.get_or_insert_with(Utc::now);
        })
    }

    async fn link_choice_list(
        &self,
        shop: &ShopDomain,
        list_id: Uuid,
    ) -> Result<(), RepositoryError> {
        update_account(&mut *self.tables.write().await, shop, |a| {
            a.choice_list_id = Some(list_id);
        })
    }

    async fn find_choice_list(
        &self,
        shop: &ShopDomain,
    ) -> Result<Option<AttributionChoiceList>, RepositoryError> {
        Ok(self.tables.read().await.choice_lists.get(shop).cloned())
    }

    async fn create_choice_list(
        &self,
        shop: &ShopDomain,
        choices: &[String],
    ) -> Result<Option<AttributionChoiceList>, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.choice_lists.contains_key(shop) {
            return Ok(None);
        }
        let now = Utc::now();
        let list = AttributionChoiceList {
            id: Uuid::new_v4(),
            shop: shop.clone(),
            choices: choices.to_vec(),
            created_at: now,
            updated_at: now,
        };
        tables.choice_lists.insert(shop.clone(), list.clone());
        Ok(Some(list))
    }

    async fn add_choices(
        &self,
        shop: &ShopDomain,
        choices: &[String],
    ) -> Result<AttributionChoiceList, RepositoryError> {
        let mut tables = self.tables.write().await;
        let list = tables
            .choice_lists
            .get_mut(shop)
            .ok_or(RepositoryError::NotFound)?;
        for choice in choices {
            if !list.choices.contains(choice) {
                list.choices.push(choice.clone());
            }
        }
        list.updated_at = Utc::now();
        Ok(list.clone())
    }

    async fn remove_choice(
        &self,
        shop: &ShopDomain,
        label: &str,
    ) -> Result<AttributionChoiceList, RepositoryError> {
        let mut tables = self.tables.write().await;
        let list = tables
            .choice_lists
            .get_mut(shop)
            .ok_or(RepositoryError::NotFound)?;
        list.choices.retain(|c| c != label);
        list.updated_at = Utc::now();
        Ok(list.clone())
    }

    async fn find_selection(
        &self,
        shop: &ShopDomain,
        customer_id: CustomerId,
    ) -> Result<Option<CustomerSelection>, RepositoryError> {
        Ok(self
            .tables
            .read()
            .await
            .selections
            .get(&(shop.clone(), customer_id))
            .cloned())
    }

    async fn upsert_selection_label(
        &self,
        shop: &ShopDomain,
        customer_id: CustomerId,
        label: &str,
    ) -> Result<CustomerSelection, RepositoryError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let selection = tables
            .selections
            .entry((shop.clone(), customer_id))
            .and_modify(|s| {
                s.label = label.to_string();
                s.updated_at = now;
            })
            .or_insert_with(|| CustomerSelection {
                shop: shop.clone(),
                customer_id,
                label: label.to_string(),
                metafield_id: None,
                created_at: now,
                updated_at: now,
            });
        Ok(selection.clone())
    }

    async fn attach_confirmation(
        &self,
        shop: &ShopDomain,
        customer_id: CustomerId,
        label: &str,
        metafield_id: MetafieldId,
    ) -> Result<CustomerSelection, RepositoryError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let selection = tables
            .selections
            .entry((shop.clone(), customer_id))
            .and_modify(|s| {
                s.metafield_id = Some(metafield_id);
                s.updated_at = now;
            })
            .or_insert_with(|| CustomerSelection {
                shop: shop.clone(),
                customer_id,
                label: label.to_string(),
                metafield_id: Some(metafield_id),
                created_at: now,
                updated_at: now,
            });
        Ok(selection.clone())
    }

    async fn find_order(
        &self,
        shop: &ShopDomain,
        order_number: i64,
    ) -> Result<Option<OrderRecord>, RepositoryError> {
        if self.miss_order_lookups.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self
            .tables
            .read()
            .await
            .orders
            .get(&(shop.clone(), order_number))
            .cloned())
    }

    async fn insert_order(&self, record: &NewOrderRecord) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        let key = (record.shop.clone(), record.order_number);
        if tables.orders.contains_key(&key) {
            return Ok(false);
        }
        tables
            .orders
            .insert(key, OrderRecord::from_new(record.clone(), Utc::now()));
        Ok(true)
    }

    async fn resolve_order(
        &self,
        shop: &ShopDomain,
        order_id: OrderId,
        label: &str,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        let Some(order) = tables.orders.values_mut().find(|o| {
            &o.shop == shop
                && o.order_id == order_id
                && o.attribution_status == AttributionStatus::Pending
        }) else {
            return Ok(false);
        };
        order.attribution = Some(label.to_string());
        order.attribution_status = AttributionStatus::Resolved;
        order.resolved_at = Some(Utc::now());
        Ok(true)
    }

    async fn mark_reconcile_attempt(
        &self,
        shop: &ShopDomain,
        order_id: OrderId,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if let Some(order) = tables.orders.values_mut().find(|o| {
            &o.shop == shop
                && o.order_id == order_id
                && o.attribution_status == AttributionStatus::Pending
        }) {
            order.last_attempt_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_orders(
        &self,
        shop: &ShopDomain,
        limit: i64,
    ) -> Result<Vec<OrderRecord>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut orders: Vec<OrderRecord> = tables
            .orders
            .values()
            .filter(|o| &o.shop == shop)
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            b.received_at
                .cmp(&a.received_at)
                .then(b.order_number.cmp(&a.order_number))
        });
        orders.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(orders)
    }

    async fn list_pending_orders(
        &self,
        received_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OrderRecord>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut orders: Vec<OrderRecord> = tables
            .orders
            .values()
            .filter(|o| {
                o.attribution_status == AttributionStatus::Pending && o.received_at < received_before
            })
            .cloned()
            .collect();
        // `None` sorts before `Some`
        orders.sort_by_key(|o| (o.last_attempt_at, o.received_at));
        orders.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(orders)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
