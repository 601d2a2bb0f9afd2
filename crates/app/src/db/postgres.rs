//! `PostgreSQL` implementation of [`AccountStore`].
//!
//! Queries are checked at runtime. Each write is one statement and relies on
//! the database for atomicity: `ON CONFLICT` for find-or-create and order
//! dedup, conditional `UPDATE` for attribution resolution.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use howheard_core::{
    AttributionStatus, BillingKind, BillingStatus, ChargeId, CustomerId, MetafieldId, OrderId,
    ShopDomain, ShopId, WebhookId,
};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AccountStore, RepositoryError};
use crate::models::{
    Account, AccountProfile, AttributionChoiceList, BillingActivation, CustomerSelection,
    CustomerSnapshot, NewOrderRecord, OrderRecord,
};

// =============================================================================
// Internal Row Types
// =============================================================================

const ACCOUNT_COLUMNS: &str = "shop, access_token, scopes, shopify_shop_id, shop_name, \
    shop_email, iana_timezone, primary_locale, plan_name, charge_id, charge_created_at, \
    billing_status, billing_kind, billing_activated_on, trial_ends_on, orders_webhook_id, \
    uninstall_webhook_id, choice_list_id, installed_at, uninstalled_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    shop: String,
    access_token: Option<String>,
    scopes: Vec<String>,
    shopify_shop_id: Option<i64>,
    shop_name: Option<String>,
    shop_email: Option<String>,
    iana_timezone: Option<String>,
    primary_locale: Option<String>,
    plan_name: Option<String>,
    charge_id: Option<i64>,
    charge_created_at: Option<DateTime<Utc>>,
    billing_status: BillingStatus,
    billing_kind: Option<BillingKind>,
    billing_activated_on: Option<NaiveDate>,
    trial_ends_on: Option<NaiveDate>,
    orders_webhook_id: Option<i64>,
    uninstall_webhook_id: Option<i64>,
    choice_list_id: Option<Uuid>,
    installed_at: DateTime<Utc>,
    uninstalled_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

fn parse_shop(raw: &str) -> Result<ShopDomain, RepositoryError> {
    ShopDomain::parse(raw)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid shop in database: {e}")))
}

impl TryFrom<AccountRow> for Account {
    type Error = RepositoryError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Self {
            shop: parse_shop(&row.shop)?,
            access_token: row.access_token.map(SecretString::from),
            scopes: row.scopes,
            profile: AccountProfile {
                shopify_shop_id: row.shopify_shop_id.map(ShopId::new),
                name: row.shop_name,
                email: row.shop_email,
                iana_timezone: row.iana_timezone,
                primary_locale: row.primary_locale,
                plan_name: row.plan_name,
            },
            charge_id: row.charge_id.map(ChargeId::new),
            charge_created_at: row.charge_created_at,
            billing_status: row.billing_status,
            billing_kind: row.billing_kind,
            billing_activated_on: row.billing_activated_on,
            trial_ends_on: row.trial_ends_on,
            orders_webhook_id: row.orders_webhook_id.map(WebhookId::new),
            uninstall_webhook_id: row.uninstall_webhook_id.map(WebhookId::new),
            choice_list_id: row.choice_list_id,
            installed_at: row.installed_at,
            uninstalled_at: row.uninstalled_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ChoiceListRow {
    id: Uuid,
    shop: String,
    choices: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ChoiceListRow> for AttributionChoiceList {
    type Error = RepositoryError;

    fn try_from(row: ChoiceListRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            shop: parse_shop(&row.shop)?,
            choices: row.choices,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SelectionRow {
    shop: String,
    customer_id: i64,
    label: String,
    metafield_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SelectionRow> for CustomerSelection {
    type Error = RepositoryError;

    fn try_from(row: SelectionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            shop: parse_shop(&row.shop)?,
            customer_id: CustomerId::new(row.customer_id),
            label: row.label,
            metafield_id: row.metafield_id.map(MetafieldId::new),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const ORDER_COLUMNS: &str = "shop, order_id, order_number, customer_id, email, first_name, \
    last_name, address1, address2, city, province, country, zip, orders_count, total_spent, \
    ordered_at, attribution, attribution_status, received_at, resolved_at, last_attempt_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    shop: String,
    order_id: i64,
    order_number: i64,
    customer_id: Option<i64>,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    address1: Option<String>,
    address2: Option<String>,
    city: Option<String>,
    province: Option<String>,
    country: Option<String>,
    zip: Option<String>,
    orders_count: Option<i64>,
    total_spent: Option<Decimal>,
    ordered_at: DateTime<Utc>,
    attribution: Option<String>,
    attribution_status: AttributionStatus,
    received_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    last_attempt_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for OrderRecord {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            shop: parse_shop(&row.shop)?,
            order_id: OrderId::new(row.order_id),
            order_number: row.order_number,
            customer: CustomerSnapshot {
                customer_id: row.customer_id.map(CustomerId::new),
                email: row.email,
                first_name: row.first_name,
                last_name: row.last_name,
                address1: row.address1,
                address2: row.address2,
                city: row.city,
                province: row.province,
                country: row.country,
                zip: row.zip,
                orders_count: row.orders_count,
                total_spent: row.total_spent,
            },
            ordered_at: row.ordered_at,
            attribution: row.attribution,
            attribution_status: row.attribution_status,
            received_at: row.received_at,
            resolved_at: row.resolved_at,
            last_attempt_at: row.last_attempt_at,
        })
    }
}

// =============================================================================
// Store
// =============================================================================

/// `PostgreSQL`-backed store.
#[derive(Debug, Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Map an `UPDATE` that touched no rows to `NotFound`.
    fn expect_one(rows_affected: u64) -> Result<(), RepositoryError> {
        if rows_affected == 0 {
            Err(RepositoryError::NotFound)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_account(&self, shop: &ShopDomain) -> Result<Option<Account>, RepositoryError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE shop = $1");
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(shop.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_or_create_account(&self, shop: &ShopDomain) -> Result<Account, RepositoryError> {
        sqlx::query("INSERT INTO accounts (shop) VALUES ($1) ON CONFLICT (shop) DO NOTHING")
            .bind(shop.as_str())
            .execute(&self.pool)
            .await?;

        self.find_account(shop).await?.ok_or(RepositoryError::NotFound)
    }

    async fn save_token(
        &self,
        shop: &ShopDomain,
        token: &SecretString,
        scopes: &[String],
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET access_token = $2, scopes = $3, uninstalled_at = NULL, updated_at = NOW()
            WHERE shop = $1
            ",
        )
        .bind(shop.as_str())
        .bind(token.expose_secret())
        .bind(scopes)
        .execute(&self.pool)
        .await?;

        Self::expect_one(result.rows_affected())
    }

    async fn save_profile(
        &self,
        shop: &ShopDomain,
        profile: &AccountProfile,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET shopify_shop_id = $2, shop_name = $3, shop_email = $4, iana_timezone = $5,
                primary_locale = $6, plan_name = $7,
                billing_status = 'pending', billing_kind = NULL,
                billing_activated_on = NULL, trial_ends_on = NULL,
                updated_at = NOW()
            WHERE shop = $1
            ",
        )
        .bind(shop.as_str())
        .bind(profile.shopify_shop_id)
        .bind(&profile.name)
        .bind(&profile.email)
        .bind(&profile.iana_timezone)
        .bind(&profile.primary_locale)
        .bind(&profile.plan_name)
        .execute(&self.pool)
        .await?;

        Self::expect_one(result.rows_affected())
    }

    async fn save_webhooks(
        &self,
        shop: &ShopDomain,
        orders: WebhookId,
        uninstall: WebhookId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET orders_webhook_id = $2, uninstall_webhook_id = $3, updated_at = NOW()
            WHERE shop = $1
            ",
        )
        .bind(shop.as_str())
        .bind(orders)
        .bind(uninstall)
        .execute(&self.pool)
        .await?;

        Self::expect_one(result.rows_affected())
    }

    async fn save_pending_charge(
        &self,
        shop: &ShopDomain,
        charge_id: ChargeId,
        created_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET charge_id = $2, charge_created_at = $3, billing_status = 'pending',
                updated_at = NOW()
            WHERE shop = $1
            ",
        )
        .bind(shop.as_str())
        .bind(charge_id)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Self::expect_one(result.rows_affected())
    }

    async fn update_billing_status(
        &self,
        shop: &ShopDomain,
        status: BillingStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE accounts SET billing_status = $2, updated_at = NOW() WHERE shop = $1",
        )
        .bind(shop.as_str())
        .bind(status)
        .execute(&self.pool)
        .await?;

        Self::expect_one(result.rows_affected())
    }

    async fn save_activation(
        &self,
        shop: &ShopDomain,
        activation: &BillingActivation,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET billing_status = 'activated', billing_kind = $2,
                billing_activated_on = $3, trial_ends_on = $4, updated_at = NOW()
            WHERE shop = $1
            ",
        )
        .bind(shop.as_str())
        .bind(activation.kind)
        .bind(activation.activated_on)
        .bind(activation.trial_ends_on)
        .execute(&self.pool)
        .await?;

        Self::expect_one(result.rows_affected())
    }

    async fn clear_installation(&self, shop: &ShopDomain) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET access_token = NULL, scopes = '{}',
                charge_id = NULL, charge_created_at = NULL, billing_status = 'none',
                billing_kind = NULL, billing_activated_on = NULL, trial_ends_on = NULL,
                orders_webhook_id = NULL, uninstall_webhook_id = NULL,
                choice_list_id = NULL,
                uninstalled_at = COALESCE(uninstalled_at, NOW()),
                updated_at = NOW()
            WHERE shop = $1
            ",
        )
        .bind(shop.as_str())
        .execute(&self.pool)
        .await?;

        Self::expect_one(result.rows_affected())
    }

    async fn link_choice_list(
        &self,
        shop: &ShopDomain,
        list_id: Uuid,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE accounts SET choice_list_id = $2, updated_at = NOW() WHERE shop = $1",
        )
        .bind(shop.as_str())
        .bind(list_id)
        .execute(&self.pool)
        .await?;

        Self::expect_one(result.rows_affected())
    }

    async fn find_choice_list(
        &self,
        shop: &ShopDomain,
    ) -> Result<Option<AttributionChoiceList>, RepositoryError> {
        let row = sqlx::query_as::<_, ChoiceListRow>(
            r"
            SELECT id, shop, choices, created_at, updated_at
            FROM attribution_choice_lists
            WHERE shop = $1
            ",
        )
        .bind(shop.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn create_choice_list(
        &self,
        shop: &ShopDomain,
        choices: &[String],
    ) -> Result<Option<AttributionChoiceList>, RepositoryError> {
        let row = sqlx::query_as::<_, ChoiceListRow>(
            r"
            INSERT INTO attribution_choice_lists (id, shop, choices)
            VALUES ($1, $2, $3)
            ON CONFLICT (shop) DO NOTHING
            RETURNING id, shop, choices, created_at, updated_at
            ",
        )
        .bind(Uuid::new_v4())
        .bind(shop.as_str())
        .bind(choices)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn add_choices(
        &self,
        shop: &ShopDomain,
        choices: &[String],
    ) -> Result<AttributionChoiceList, RepositoryError> {
        // Append in submitted order, skipping labels already in the list.
        let row = sqlx::query_as::<_, ChoiceListRow>(
            r"
            UPDATE attribution_choice_lists l
            SET choices = l.choices || COALESCE((
                    SELECT array_agg(c.label ORDER BY c.ord)
                    FROM unnest($2::text[]) WITH ORDINALITY AS c(label, ord)
                    WHERE NOT (c.label = ANY(l.choices))
                ), '{}'),
                updated_at = NOW()
            WHERE l.shop = $1
            RETURNING id, shop, choices, created_at, updated_at
            ",
        )
        .bind(shop.as_str())
        .bind(choices)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn remove_choice(
        &self,
        shop: &ShopDomain,
        label: &str,
    ) -> Result<AttributionChoiceList, RepositoryError> {
        let row = sqlx::query_as::<_, ChoiceListRow>(
            r"
            UPDATE attribution_choice_lists
            SET choices = array_remove(choices, $2), updated_at = NOW()
            WHERE shop = $1
            RETURNING id, shop, choices, created_at, updated_at
            ",
        )
        .bind(shop.as_str())
        .bind(label)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn find_selection(
        &self,
        shop: &ShopDomain,
        customer_id: CustomerId,
    ) -> Result<Option<CustomerSelection>, RepositoryError> {
        let row = sqlx::query_as::<_, SelectionRow>(
            r"
            SELECT shop, customer_id, label, metafield_id, created_at, updated_at
            FROM customer_selections
            WHERE shop = $1 AND customer_id = $2
            ",
        )
        .bind(shop.as_str())
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn upsert_selection_label(
        &self,
        shop: &ShopDomain,
        customer_id: CustomerId,
        label: &str,
    ) -> Result<CustomerSelection, RepositoryError> {
        let row = sqlx::query_as::<_, SelectionRow>(
            r"
            INSERT INTO customer_selections (shop, customer_id, label)
            VALUES ($1, $2, $3)
            ON CONFLICT (shop, customer_id)
            DO UPDATE SET label = EXCLUDED.label, updated_at = NOW()
            RETURNING shop, customer_id, label, metafield_id, created_at, updated_at
            ",
        )
        .bind(shop.as_str())
        .bind(customer_id)
        .bind(label)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn attach_confirmation(
        &self,
        shop: &ShopDomain,
        customer_id: CustomerId,
        label: &str,
        metafield_id: MetafieldId,
    ) -> Result<CustomerSelection, RepositoryError> {
        let row = sqlx::query_as::<_, SelectionRow>(
            r"
            INSERT INTO customer_selections (shop, customer_id, label, metafield_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (shop, customer_id)
            DO UPDATE SET metafield_id = EXCLUDED.metafield_id, updated_at = NOW()
            RETURNING shop, customer_id, label, metafield_id, created_at, updated_at
            ",
        )
        .bind(shop.as_str())
        .bind(customer_id)
        .bind(label)
        .bind(metafield_id)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_order(
        &self,
        shop: &ShopDomain,
        order_number: i64,
    ) -> Result<Option<OrderRecord>, RepositoryError> {
        let sql =
            format!("SELECT {ORDER_COLUMNS} FROM order_records WHERE shop = $1 AND order_number = $2");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(shop.as_str())
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn insert_order(&self, record: &NewOrderRecord) -> Result<bool, RepositoryError> {
        let c = &record.customer;
        let result = sqlx::query(
            r"
            INSERT INTO order_records (
                shop, order_id, order_number, customer_id, email, first_name, last_name,
                address1, address2, city, province, country, zip, orders_count, total_spent,
                ordered_at, attribution_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (shop, order_number) DO NOTHING
            ",
        )
        .bind(record.shop.as_str())
        .bind(record.order_id)
        .bind(record.order_number)
        .bind(c.customer_id)
        .bind(&c.email)
        .bind(&c.first_name)
        .bind(&c.last_name)
        .bind(&c.address1)
        .bind(&c.address2)
        .bind(&c.city)
        .bind(&c.province)
        .bind(&c.country)
        .bind(&c.zip)
        .bind(c.orders_count)
        .bind(c.total_spent)
        .bind(record.ordered_at)
        .bind(record.attribution_status)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn resolve_order(
        &self,
        shop: &ShopDomain,
        order_id: OrderId,
        label: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE order_records
            SET attribution = $3, attribution_status = 'resolved', resolved_at = NOW()
            WHERE shop = $1 AND order_id = $2 AND attribution_status = 'pending'
            ",
        )
        .bind(shop.as_str())
        .bind(order_id)
        .bind(label)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_reconcile_attempt(
        &self,
        shop: &ShopDomain,
        order_id: OrderId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE order_records
            SET last_attempt_at = NOW()
            WHERE shop = $1 AND order_id = $2 AND attribution_status = 'pending'
            ",
        )
        .bind(shop.as_str())
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_orders(
        &self,
        shop: &ShopDomain,
        limit: i64,
    ) -> Result<Vec<OrderRecord>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM order_records WHERE shop = $1 \
             ORDER BY received_at DESC, order_number DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(shop.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_pending_orders(
        &self,
        received_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OrderRecord>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM order_records \
             WHERE attribution_status = 'pending' AND received_at < $1 \
             ORDER BY last_attempt_at ASC NULLS FIRST, received_at ASC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(received_before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
