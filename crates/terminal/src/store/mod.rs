//! Remote store access.
//!
//! The remote store is the single authority for profiles, products and
//! sales. Components talk to it through three traits so the commit
//! algorithm and the session logic stay storage-agnostic:
//!
//! - [`TransactionalStore`] - optimistic `read` / `write_all` over stock and sales
//! - [`ProfileSource`] - `users/{id}` reads and usage-counter writes
//! - [`ProductSource`] - catalog listing for PDV lookups
//!
//! # Backends
//!
//! - [`memory::MemoryStore`] - in-process, versioned, for tests and demos
//! - [`postgres::PgStore`] - `PostgreSQL` via `sqlx`

pub mod document;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use balcao_core::{
    BusinessId, CatalogItem, Money, MonthlyUsage, PaymentEntry, ProductId, ProfileId, SaleLine,
    SaleRecord, StockItem, SubscriptionStatus,
};

pub use document::{RemoteMonthlyOrders, RemoteProfileDocument, RemoteSubscription, RemoteTimestamp};

/// Errors from the remote store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The read set was invalidated by a concurrent writer.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failure.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested document was not found.
    #[error("not found")]
    NotFound,

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the store could not be reached at all, as opposed to
    /// answering with an error.
    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_)
                | Self::Database(sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
        )
    }
}

/// Conditional stock update: applies only if the product is still at
/// `expected_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockWrite {
    pub product_id: ProductId,
    pub expected_version: i64,
    pub quantity_on_hand: i64,
}

/// A sale ready to be persisted; the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleDraft {
    pub business_id: BusinessId,
    pub lines: Vec<SaleLine>,
    pub subtotal: Money,
    pub discount: Money,
    pub surcharge: Money,
    pub final_amount: Money,
    pub payments: Vec<PaymentEntry>,
}

/// Everything one commit writes. Applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSet {
    pub stock: Vec<StockWrite>,
    pub sale: SaleDraft,
}

/// Optimistic transactional access to stock and sales.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Read the current stock entries for `product_ids`.
    ///
    /// Unknown products are omitted from the result.
    async fn read(&self, product_ids: &[ProductId]) -> Result<Vec<StockItem>, StoreError>;

    /// Atomically apply every stock write and create the sale.
    ///
    /// Returns `StoreError::Conflict` without writing anything if any stock
    /// entry has moved past its expected version.
    async fn write_all(&self, writes: WriteSet) -> Result<SaleRecord, StoreError>;
}

/// Remote profile documents (`users/{id}`).
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Fetch the raw remote profile document.
    async fn fetch_profile(
        &self,
        id: &ProfileId,
    ) -> Result<Option<RemoteProfileDocument>, StoreError>;

    /// Write the monthly usage counter and derived status in one update.
    async fn update_usage(
        &self,
        id: &ProfileId,
        usage: MonthlyUsage,
        status: SubscriptionStatus,
    ) -> Result<(), StoreError>;
}

/// Remote product documents (`products/{id}`).
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// List a business's products.
    async fn list_products(&self, business_id: &BusinessId)
    -> Result<Vec<CatalogItem>, StoreError>;
}
