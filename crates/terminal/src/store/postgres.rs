//! `PostgreSQL` remote store.
//!
//! # Tables
//!
//! - `users` - Profiles, including the monthly usage counter
//! - `products` - Catalog fields plus the stock ledger (`quantity_on_hand`, `version`)
//! - `sales`, `sale_lines`, `sale_payments` - Completed sales
//!
//! # Migrations
//!
//! Migrations live in `crates/terminal/migrations/` and are embedded with
//! `sqlx::migrate!`. [`PgStore::migrate`] applies them; `Terminal::start`
//! calls it when `BALCAO_RUN_MIGRATIONS` is set, otherwise a deployment
//! step runs them against the shared database once for all terminals.
//!
//! Stock writes are conditional on the `version` read earlier in the same
//! commit attempt, so two terminals decrementing the same product never both
//! succeed against the same pre-image.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, instrument};
use uuid::Uuid;

use balcao_core::{
    BusinessId, CatalogItem, Money, MonthlyUsage, ProductId, ProfileId, SaleId, SaleRecord,
    SaleStatus, StockItem, SubscriptionStatus,
};

use super::{
    ProductSource, ProfileSource, RemoteMonthlyOrders, RemoteProfileDocument, RemoteSubscription,
    RemoteTimestamp, StoreError, TransactionalStore, WriteSet,
};

/// SQLSTATE codes that mean "another transaction got there first".
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    id: ProductId,
    name: String,
    quantity_on_hand: i64,
    version: i64,
}

impl From<StockRow> for StockItem {
    fn from(row: StockRow) -> Self {
        Self {
            product_id: row.id,
            name: row.name,
            quantity_on_hand: row.quantity_on_hand,
            version: row.version,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    business_id: BusinessId,
    name: String,
    unit_price: Decimal,
    cost_price: Option<Decimal>,
    quantity_on_hand: i64,
    active: bool,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for CatalogItem {
    fn from(row: ProductRow) -> Self {
        Self {
            product_id: row.id,
            business_id: row.business_id,
            name: row.name,
            unit_price: Money::new(row.unit_price),
            cost_price: row.cost_price.map(Money::new),
            quantity_on_hand: row.quantity_on_hand,
            active: row.active,
            updated_at: Some(row.updated_at.to_rfc3339()),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: ProfileId,
    email: Option<String>,
    display_name: Option<String>,
    role: Option<String>,
    business_id: Option<String>,
    plan_id: Option<String>,
    credential_digest: Option<String>,
    subscription_status: Option<SubscriptionStatus>,
    usage_month: Option<String>,
    usage_count: Option<i32>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for RemoteProfileDocument {
    fn from(row: UserRow) -> Self {
        let monthly_orders = row.usage_month.map(|month| RemoteMonthlyOrders {
            month: Some(month),
            count: row.usage_count.and_then(|count| u32::try_from(count).ok()),
        });

        Self {
            id: row.id,
            display_name: row.display_name,
            email: row.email,
            role: row.role,
            business_id: row.business_id,
            plan_id: row.plan_id,
            credential_digest: row.credential_digest,
            subscription: Some(RemoteSubscription {
                plan_id: None,
                status: row.subscription_status.map(|s| s.as_str().to_owned()),
                monthly_orders,
            }),
            created_at: row.created_at.map(RemoteTimestamp::Native),
            updated_at: row.updated_at.map(RemoteTimestamp::Native),
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// Remote store backed by `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a connection pool with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the connection cannot be established.
    pub async fn connect(database_url: &SecretString) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url.expose_secret())
            .await?;
        Ok(Self { pool })
    }

    /// Apply the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Migration` if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map serialization failures and deadlocks to retryable conflicts.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && matches!(
            db_err.code().as_deref(),
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
        )
    {
        return StoreError::Conflict(db_err.message().to_owned());
    }
    StoreError::Database(err)
}

fn to_i32(value: usize, what: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::DataCorruption(format!("{what} out of range")))
}

#[async_trait]
impl TransactionalStore for PgStore {
    #[instrument(skip(self))]
    async fn read(&self, product_ids: &[ProductId]) -> Result<Vec<StockItem>, StoreError> {
        let ids: Vec<String> = product_ids.iter().map(|id| id.as_str().to_owned()).collect();

        let rows = sqlx::query_as::<_, StockRow>(
            r"
            SELECT id, name, quantity_on_hand, version
            FROM products
            WHERE id = ANY($1)
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StockItem::from).collect())
    }

    #[instrument(skip(self, writes), fields(products = writes.stock.len()))]
    async fn write_all(&self, writes: WriteSet) -> Result<SaleRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        for write in &writes.stock {
            let result = sqlx::query(
                r"
                UPDATE products
                SET quantity_on_hand = $1, version = version + 1, updated_at = now()
                WHERE id = $2 AND version = $3
                ",
            )
            .bind(write.quantity_on_hand)
            .bind(&write.product_id)
            .bind(write.expected_version)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(StoreError::Conflict(format!(
                    "product {} is no longer at version {}",
                    write.product_id, write.expected_version
                )));
            }
        }

        let draft = writes.sale;
        let (sale_id, created_at): (Uuid, DateTime<Utc>) = sqlx::query_as(
            r"
            INSERT INTO sales (business_id, subtotal, discount, surcharge, final_amount)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, created_at
            ",
        )
        .bind(&draft.business_id)
        .bind(draft.subtotal.amount())
        .bind(draft.discount.amount())
        .bind(draft.surcharge.amount())
        .bind(draft.final_amount.amount())
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        for (position, line) in draft.lines.iter().enumerate() {
            let quantity = i32::try_from(line.quantity).map_err(|_| {
                StoreError::DataCorruption(format!("quantity out of range for {}", line.product_id))
            })?;
            sqlx::query(
                r"
                INSERT INTO sale_lines
                    (sale_id, position, product_id, name, unit_price, quantity, cost_price, note, line_total)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ",
            )
            .bind(sale_id)
            .bind(to_i32(position, "line position")?)
            .bind(&line.product_id)
            .bind(&line.name)
            .bind(line.unit_price.amount())
            .bind(quantity)
            .bind(line.cost_price.map(|p| p.amount()))
            .bind(line.note.as_deref())
            .bind(line.line_total.amount())
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        }

        for (position, payment) in draft.payments.iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO sale_payments (sale_id, position, method, amount_paid, change)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(sale_id)
            .bind(to_i32(position, "payment position")?)
            .bind(payment.method)
            .bind(payment.amount_paid.amount())
            .bind(payment.change.amount())
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        }

        tx.commit().await.map_err(classify)?;
        debug!(%sale_id, "sale transaction committed");

        Ok(SaleRecord {
            id: SaleId::new(sale_id.to_string()),
            business_id: draft.business_id,
            lines: draft.lines,
            subtotal: draft.subtotal,
            discount: draft.discount,
            surcharge: draft.surcharge,
            final_amount: draft.final_amount,
            payments: draft.payments,
            status: SaleStatus::Completed,
            created_at,
        })
    }
}

#[async_trait]
impl ProfileSource for PgStore {
    #[instrument(skip(self))]
    async fn fetch_profile(
        &self,
        id: &ProfileId,
    ) -> Result<Option<RemoteProfileDocument>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, email, display_name, role, business_id, plan_id, credential_digest,
                   subscription_status, usage_month, usage_count, created_at, updated_at
            FROM users
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RemoteProfileDocument::from))
    }

    #[instrument(skip(self))]
    async fn update_usage(
        &self,
        id: &ProfileId,
        usage: MonthlyUsage,
        status: SubscriptionStatus,
    ) -> Result<(), StoreError> {
        let count = i32::try_from(usage.count)
            .map_err(|_| StoreError::DataCorruption("usage count out of range".to_owned()))?;

        let result = sqlx::query(
            r"
            UPDATE users
            SET usage_month = $1, usage_count = $2, subscription_status = $3, updated_at = now()
            WHERE id = $4
            ",
        )
        .bind(usage.month.to_string())
        .bind(count)
        .bind(status)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl ProductSource for PgStore {
    #[instrument(skip(self))]
    async fn list_products(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<CatalogItem>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, business_id, name, unit_price, cost_price, quantity_on_hand, active, updated_at
            FROM products
            WHERE business_id = $1
            ORDER BY name
            ",
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CatalogItem::from).collect())
    }
}
