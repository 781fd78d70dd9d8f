//! In-process remote store.
//!
//! Behaves like the real store where it matters for correctness: every
//! product carries a version, `write_all` checks the whole read set before
//! touching anything, and a stale write fails with `StoreError::Conflict`.
//! Test hooks can inject conflicts or take the store offline.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use balcao_core::{
    BusinessId, CatalogItem, MonthlyUsage, ProductId, ProfileId, SaleId, SaleRecord, SaleStatus,
    StockItem, SubscriptionStatus,
};

use super::{
    ProductSource, ProfileSource, RemoteMonthlyOrders, RemoteProfileDocument, RemoteSubscription,
    StoreError, TransactionalStore, WriteSet,
};

#[derive(Debug, Clone)]
struct ProductDoc {
    item: CatalogItem,
    version: i64,
}

#[derive(Debug, Default)]
struct MemoryState {
    products: BTreeMap<ProductId, ProductDoc>,
    profiles: HashMap<ProfileId, RemoteProfileDocument>,
    sales: Vec<SaleRecord>,
    injected_conflicts: u32,
    unavailable: bool,
}

impl MemoryState {
    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("memory store is offline".to_owned()));
        }
        Ok(())
    }
}

/// Versioned in-memory store implementing every remote store trait.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a product at version 1.
    pub async fn insert_product(&self, item: CatalogItem) {
        let mut state = self.state.lock().await;
        state
            .products
            .insert(item.product_id.clone(), ProductDoc { item, version: 1 });
    }

    /// Insert or replace a profile document.
    pub async fn insert_profile(&self, doc: RemoteProfileDocument) {
        let mut state = self.state.lock().await;
        state.profiles.insert(doc.id.clone(), doc);
    }

    /// Current stock of a product.
    pub async fn stock_of(&self, product_id: &ProductId) -> Option<i64> {
        let state = self.state.lock().await;
        state
            .products
            .get(product_id)
            .map(|doc| doc.item.quantity_on_hand)
    }

    /// Every product's stock, keyed by id.
    pub async fn stock_snapshot(&self) -> BTreeMap<ProductId, i64> {
        let state = self.state.lock().await;
        state
            .products
            .iter()
            .map(|(id, doc)| (id.clone(), doc.item.quantity_on_hand))
            .collect()
    }

    /// All recorded sales, oldest first.
    pub async fn sales(&self) -> Vec<SaleRecord> {
        self.state.lock().await.sales.clone()
    }

    /// The stored profile document.
    pub async fn profile(&self, id: &ProfileId) -> Option<RemoteProfileDocument> {
        self.state.lock().await.profiles.get(id).cloned()
    }

    /// Reject the next `count` writes as if another terminal had written
    /// the same products first.
    pub async fn inject_conflicts(&self, count: u32) {
        self.state.lock().await.injected_conflicts = count;
    }

    /// Make every operation fail with `StoreError::Unavailable`.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }
}

#[async_trait]
impl TransactionalStore for MemoryStore {
    async fn read(&self, product_ids: &[ProductId]) -> Result<Vec<StockItem>, StoreError> {
        let state = self.state.lock().await;
        state.ensure_available()?;

        Ok(product_ids
            .iter()
            .filter_map(|id| state.products.get(id))
            .map(|doc| StockItem {
                product_id: doc.item.product_id.clone(),
                name: doc.item.name.clone(),
                quantity_on_hand: doc.item.quantity_on_hand,
                version: doc.version,
            })
            .collect())
    }

    async fn write_all(&self, writes: WriteSet) -> Result<SaleRecord, StoreError> {
        let mut state = self.state.lock().await;
        state.ensure_available()?;

        if state.injected_conflicts > 0 {
            state.injected_conflicts -= 1;
            // A concurrent writer touched every product in the read set
            for write in &writes.stock {
                if let Some(doc) = state.products.get_mut(&write.product_id) {
                    doc.version += 1;
                }
            }
            return Err(StoreError::Conflict("injected concurrent write".to_owned()));
        }

        for write in &writes.stock {
            let current = state
                .products
                .get(&write.product_id)
                .map(|doc| doc.version);
            if current != Some(write.expected_version) {
                return Err(StoreError::Conflict(format!(
                    "product {} moved from version {} to {:?}",
                    write.product_id, write.expected_version, current
                )));
            }
        }

        for write in writes.stock {
            if let Some(doc) = state.products.get_mut(&write.product_id) {
                doc.item.quantity_on_hand = write.quantity_on_hand;
                doc.version += 1;
            }
        }

        let draft = writes.sale;
        let sale = SaleRecord {
            id: SaleId::new(Uuid::new_v4().to_string()),
            business_id: draft.business_id,
            lines: draft.lines,
            subtotal: draft.subtotal,
            discount: draft.discount,
            surcharge: draft.surcharge,
            final_amount: draft.final_amount,
            payments: draft.payments,
            status: SaleStatus::Completed,
            created_at: Utc::now(),
        };
        state.sales.push(sale.clone());

        Ok(sale)
    }
}

#[async_trait]
impl ProfileSource for MemoryStore {
    async fn fetch_profile(
        &self,
        id: &ProfileId,
    ) -> Result<Option<RemoteProfileDocument>, StoreError> {
        let state = self.state.lock().await;
        state.ensure_available()?;
        Ok(state.profiles.get(id).cloned())
    }

    async fn update_usage(
        &self,
        id: &ProfileId,
        usage: MonthlyUsage,
        status: SubscriptionStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.ensure_available()?;

        let doc = state.profiles.get_mut(id).ok_or(StoreError::NotFound)?;
        let subscription = doc.subscription.get_or_insert_with(RemoteSubscription::default);
        subscription.monthly_orders = Some(RemoteMonthlyOrders {
            month: Some(usage.month.to_string()),
            count: Some(usage.count),
        });
        subscription.status = Some(status.as_str().to_owned());
        Ok(())
    }
}

#[async_trait]
impl ProductSource for MemoryStore {
    async fn list_products(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<CatalogItem>, StoreError> {
        let state = self.state.lock().await;
        state.ensure_available()?;
        Ok(state
            .products
            .values()
            .filter(|doc| &doc.item.business_id == business_id)
            .map(|doc| doc.item.clone())
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use balcao_core::Money;

    use super::super::{SaleDraft, StockWrite};
    use super::*;

    fn product(id: &str, stock: i64) -> CatalogItem {
        CatalogItem {
            product_id: ProductId::new(id),
            business_id: BusinessId::new("b1"),
            name: format!("Product {id}"),
            unit_price: Money::from_units(10),
            cost_price: None,
            quantity_on_hand: stock,
            active: true,
            updated_at: None,
        }
    }

    fn write_set(product_id: &str, version: i64, quantity: i64) -> WriteSet {
        WriteSet {
            stock: vec![StockWrite {
                product_id: ProductId::new(product_id),
                expected_version: version,
                quantity_on_hand: quantity,
            }],
            sale: SaleDraft {
                business_id: BusinessId::new("b1"),
                lines: Vec::new(),
                subtotal: Money::ZERO,
                discount: Money::ZERO,
                surcharge: Money::ZERO,
                final_amount: Money::ZERO,
                payments: Vec::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_stale_write_is_rejected_without_side_effects() {
        let store = MemoryStore::new();
        store.insert_product(product("p1", 5)).await;

        let first = store.read(&[ProductId::new("p1")]).await.unwrap();
        let second = store.read(&[ProductId::new("p1")]).await.unwrap();
        assert_eq!(first, second);

        let version = first.first().unwrap().version;
        store.write_all(write_set("p1", version, 2)).await.unwrap();

        let err = store.write_all(write_set("p1", version, 2)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.stock_of(&ProductId::new("p1")).await, Some(2));
        assert_eq!(store.sales().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_products_are_omitted_from_reads() {
        let store = MemoryStore::new();
        store.insert_product(product("p1", 5)).await;

        let items = store
            .read(&[ProductId::new("p1"), ProductId::new("ghost")])
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_conflict_bumps_versions() {
        let store = MemoryStore::new();
        store.insert_product(product("p1", 5)).await;
        store.inject_conflicts(1).await;

        let err = store.write_all(write_set("p1", 1, 4)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let items = store.read(&[ProductId::new("p1")]).await.unwrap();
        assert_eq!(items.first().unwrap().version, 2);
        assert_eq!(items.first().unwrap().quantity_on_hand, 5);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true).await;
        assert!(matches!(
            store.list_products(&BusinessId::new("b1")).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
