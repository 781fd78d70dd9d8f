//! PDV catalog lookups.
//!
//! Online, products come from the remote store and every successful listing
//! is written through to the replica. Offline, or when the remote read
//! fails, the replica answers instead.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use balcao_core::{BusinessId, CatalogItem, ProductId};

use crate::network::NetworkHealthMonitor;
use crate::replica::{LocalReplicaStore, ReplicaError};
use crate::store::ProductSource;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Replica(#[from] ReplicaError),
}

/// Where a listing came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogOrigin {
    Remote,
    Replica,
}

/// Products of one business, ordered by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogView {
    pub items: Vec<CatalogItem>,
    pub origin: CatalogOrigin,
}

pub struct Catalog {
    monitor: Arc<NetworkHealthMonitor>,
    source: Arc<dyn ProductSource>,
    replica: LocalReplicaStore,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("replica", &self.replica)
            .finish_non_exhaustive()
    }
}

impl Catalog {
    #[must_use]
    pub fn new(
        monitor: Arc<NetworkHealthMonitor>,
        source: Arc<dyn ProductSource>,
        replica: LocalReplicaStore,
    ) -> Self {
        Self {
            monitor,
            source,
            replica,
        }
    }

    /// List a business's products from the best available source.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Replica` only when the replica itself cannot
    /// be read; remote failures fall back to the replica.
    #[instrument(skip(self))]
    pub async fn products(&self, business_id: &BusinessId) -> Result<CatalogView, CatalogError> {
        if self.monitor.current_status().is_online() {
            match self.source.list_products(business_id).await {
                Ok(mut items) => {
                    for item in &items {
                        if let Err(e) = self.replica.upsert_product(item).await {
                            warn!(product_id = %item.product_id, error = %e, "could not replicate product");
                        }
                    }
                    items.sort_by(|a, b| a.name.cmp(&b.name));
                    debug!(count = items.len(), "catalog served from remote");
                    return Ok(CatalogView {
                        items,
                        origin: CatalogOrigin::Remote,
                    });
                }
                Err(e) => {
                    if e.is_unreachable() {
                        self.monitor.trigger();
                    }
                    warn!(error = %e, "remote catalog read failed, using replica");
                }
            }
        }

        let items = self.replica.list_products(business_id).await?;
        debug!(count = items.len(), "catalog served from replica");
        Ok(CatalogView {
            items,
            origin: CatalogOrigin::Replica,
        })
    }

    /// Look up one replicated product.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Replica` if the replica cannot be read.
    pub async fn product(&self, id: &ProductId) -> Result<Option<CatalogItem>, CatalogError> {
        Ok(self.replica.find_product(id).await?)
    }
}
