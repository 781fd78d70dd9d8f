//! Product stock and catalog records.

use serde::{Deserialize, Serialize};

use super::{BusinessId, Money, ProductId};

/// Stock ledger entry for one product, as read inside a commit transaction.
///
/// `version` is the optimistic-concurrency token: a write made against a
/// stale version is rejected by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub product_id: ProductId,
    /// Product name at read time, snapshotted into sale lines.
    pub name: String,
    pub quantity_on_hand: i64,
    pub version: i64,
}

/// Product document as the PDV catalog shows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub product_id: ProductId,
    pub business_id: BusinessId,
    pub name: String,
    pub unit_price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_price: Option<Money>,
    pub quantity_on_hand: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

const fn default_active() -> bool {
    true
}
