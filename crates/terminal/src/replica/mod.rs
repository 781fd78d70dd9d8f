//! Local replica store.
//!
//! A `SQLite` database on the terminal that mirrors the profiles and
//! products this terminal has seen, plus the single-slot offline session
//! marker. The remote store stays the authority; the replica is a
//! read-through copy that keeps login and catalog lookups working while
//! the network is down.
//!
//! # Tables
//!
//! - `profiles` - Canonical [`Profile`] documents keyed by id, unique by identifier
//! - `products` - Last known [`CatalogItem`] per product
//! - `session_marker` - At most one row: the profile of the active offline session
//!
//! Profile reads go through a `moka` cache that every write invalidates.

pub mod normalize;

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, instrument};

use balcao_core::{BusinessId, CatalogItem, LoginIdentifier, ProductId, Profile, ProfileId};

use crate::store::RemoteProfileDocument;

pub use normalize::{canonical_instant, normalize_timestamp, profile_from_remote};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY NOT NULL,
    identifier TEXT NOT NULL UNIQUE,
    document TEXT NOT NULL,
    replicated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS products (
    id TEXT PRIMARY KEY NOT NULL,
    business_id TEXT NOT NULL,
    document TEXT NOT NULL,
    replicated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_products_business ON products (business_id);

CREATE TABLE IF NOT EXISTS session_marker (
    slot INTEGER PRIMARY KEY NOT NULL CHECK (slot = 1),
    profile_id TEXT NOT NULL,
    saved_at TEXT NOT NULL
);
";

/// Errors from the local replica.
#[derive(Debug, Error)]
pub enum ReplicaError {
    /// Database error from sqlx.
    #[error("replica database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored document could not be encoded or decoded.
    #[error("replica serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data does not match its key.
    #[error("replica data corruption: {0}")]
    DataCorruption(String),

    /// A remote document lacks a field the replica cannot default.
    #[error("remote document is missing `{0}`")]
    MissingField(&'static str),
}

/// The terminal's local replica.
///
/// Cloning shares the pool and the cache.
#[derive(Clone)]
pub struct LocalReplicaStore {
    pool: SqlitePool,
    profiles: Cache<ProfileId, Profile>,
}

impl std::fmt::Debug for LocalReplicaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalReplicaStore")
            .field("cached_profiles", &self.profiles.entry_count())
            .finish_non_exhaustive()
    }
}

impl LocalReplicaStore {
    /// Open (creating if needed) the replica at `url` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns `ReplicaError::Database` if the file cannot be opened or the
    /// schema cannot be applied.
    pub async fn open(url: &str) -> Result<Self, ReplicaError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// A throwaway replica that lives as long as the returned handle.
    ///
    /// # Errors
    ///
    /// Returns `ReplicaError::Database` if the schema cannot be applied.
    pub async fn in_memory() -> Result<Self, ReplicaError> {
        // Every connection to `:memory:` is its own database, so pin to one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, ReplicaError> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;

        let profiles = Cache::builder()
            .max_capacity(256)
            .time_to_live(Duration::from_secs(300))
            .build();

        Ok(Self { pool, profiles })
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    /// Store a canonical profile, replacing any row with the same id or
    /// the same identifier.
    ///
    /// # Errors
    ///
    /// Returns `ReplicaError` if the write fails.
    #[instrument(skip(self, profile), fields(profile_id = %profile.id))]
    pub async fn upsert_profile(&self, profile: &Profile) -> Result<(), ReplicaError> {
        let document = serde_json::to_string(profile)?;
        let now = canonical_instant(&Utc::now());

        let mut tx = self.pool.begin().await?;

        // An identifier may have moved to a new account; the newest owner wins
        sqlx::query("DELETE FROM profiles WHERE identifier = ?1 AND id <> ?2")
            .bind(profile.identifier.as_str())
            .bind(profile.id.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r"
            INSERT INTO profiles (id, identifier, document, replicated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (id) DO UPDATE SET
                identifier = excluded.identifier,
                document = excluded.document,
                replicated_at = excluded.replicated_at
            ",
        )
        .bind(profile.id.as_str())
        .bind(profile.identifier.as_str())
        .bind(document)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        // Displaced rows may be cached under their own id
        self.profiles.invalidate_all();
        debug!("profile replicated");
        Ok(())
    }

    /// Normalize a remote document and store it.
    ///
    /// # Errors
    ///
    /// Returns `ReplicaError::MissingField` if the document cannot be
    /// normalized, or a database error if the write fails.
    pub async fn upsert_remote(&self, doc: &RemoteProfileDocument) -> Result<Profile, ReplicaError> {
        let profile = profile_from_remote(doc)?;
        self.upsert_profile(&profile).await?;
        Ok(profile)
    }

    /// Look up a profile by id.
    ///
    /// # Errors
    ///
    /// Returns `ReplicaError` if the read fails or the stored document is corrupt.
    pub async fn find_by_id(&self, id: &ProfileId) -> Result<Option<Profile>, ReplicaError> {
        if let Some(profile) = self.profiles.get(id).await {
            return Ok(Some(profile));
        }

        let document: Option<String> =
            sqlx::query_scalar("SELECT document FROM profiles WHERE id = ?1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        let Some(document) = document else {
            return Ok(None);
        };
        let profile: Profile = serde_json::from_str(&document)?;
        if &profile.id != id {
            return Err(ReplicaError::DataCorruption(format!(
                "profile row {id} holds document for {}",
                profile.id
            )));
        }

        self.profiles.insert(id.clone(), profile.clone()).await;
        Ok(Some(profile))
    }

    /// Look up a profile by login identifier.
    ///
    /// # Errors
    ///
    /// Returns `ReplicaError` if the read fails or the stored document is corrupt.
    pub async fn find_by_identifier(
        &self,
        identifier: &LoginIdentifier,
    ) -> Result<Option<Profile>, ReplicaError> {
        let document: Option<String> =
            sqlx::query_scalar("SELECT document FROM profiles WHERE identifier = ?1")
                .bind(identifier.as_str())
                .fetch_optional(&self.pool)
                .await?;

        document
            .map(|doc| serde_json::from_str(&doc).map_err(ReplicaError::from))
            .transpose()
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Store the last known state of a product.
    ///
    /// # Errors
    ///
    /// Returns `ReplicaError` if the write fails.
    pub async fn upsert_product(&self, item: &CatalogItem) -> Result<(), ReplicaError> {
        let document = serde_json::to_string(item)?;
        sqlx::query(
            r"
            INSERT INTO products (id, business_id, document, replicated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (id) DO UPDATE SET
                business_id = excluded.business_id,
                document = excluded.document,
                replicated_at = excluded.replicated_at
            ",
        )
        .bind(item.product_id.as_str())
        .bind(item.business_id.as_str())
        .bind(document)
        .bind(canonical_instant(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Look up a product.
    ///
    /// # Errors
    ///
    /// Returns `ReplicaError` if the read fails or the stored document is corrupt.
    pub async fn find_product(&self, id: &ProductId) -> Result<Option<CatalogItem>, ReplicaError> {
        let document: Option<String> =
            sqlx::query_scalar("SELECT document FROM products WHERE id = ?1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        document
            .map(|doc| serde_json::from_str(&doc).map_err(ReplicaError::from))
            .transpose()
    }

    /// Every replicated product of a business, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `ReplicaError` if the read fails or a stored document is corrupt.
    pub async fn list_products(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<CatalogItem>, ReplicaError> {
        let documents: Vec<String> =
            sqlx::query_scalar("SELECT document FROM products WHERE business_id = ?1")
                .bind(business_id.as_str())
                .fetch_all(&self.pool)
                .await?;

        let mut items = documents
            .iter()
            .map(|doc| serde_json::from_str::<CatalogItem>(doc))
            .collect::<Result<Vec<_>, _>>()?;
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    // =========================================================================
    // Offline session marker
    // =========================================================================

    /// Remember `id` as the active offline session.
    ///
    /// # Errors
    ///
    /// Returns `ReplicaError` if the write fails.
    pub async fn set_offline_marker(&self, id: &ProfileId) -> Result<(), ReplicaError> {
        sqlx::query(
            r"
            INSERT INTO session_marker (slot, profile_id, saved_at)
            VALUES (1, ?1, ?2)
            ON CONFLICT (slot) DO UPDATE SET
                profile_id = excluded.profile_id,
                saved_at = excluded.saved_at
            ",
        )
        .bind(id.as_str())
        .bind(canonical_instant(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The profile id of the persisted offline session, if any.
    ///
    /// # Errors
    ///
    /// Returns `ReplicaError` if the read fails.
    pub async fn offline_marker(&self) -> Result<Option<ProfileId>, ReplicaError> {
        let id: Option<String> =
            sqlx::query_scalar("SELECT profile_id FROM session_marker WHERE slot = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(id.map(ProfileId::new))
    }

    /// Forget the persisted offline session.
    ///
    /// # Errors
    ///
    /// Returns `ReplicaError` if the write fails.
    pub async fn clear_offline_marker(&self) -> Result<(), ReplicaError> {
        sqlx::query("DELETE FROM session_marker")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use balcao_core::Money;

    use super::*;

    fn doc(id: &str, email: &str) -> RemoteProfileDocument {
        let mut doc = RemoteProfileDocument::new(id, email);
        doc.credential_digest = Some("digest".to_owned());
        doc
    }

    #[tokio::test]
    async fn test_profile_is_found_by_id_and_identifier() {
        let replica = LocalReplicaStore::in_memory().await.unwrap();
        replica.upsert_remote(&doc("u1", "Ana@Loja.com")).await.unwrap();

        let by_id = replica.find_by_id(&ProfileId::new("u1")).await.unwrap().unwrap();
        let identifier = LoginIdentifier::parse("ana@loja.com").unwrap();
        let by_identifier = replica.find_by_identifier(&identifier).await.unwrap().unwrap();

        assert_eq!(by_id, by_identifier);
        assert_eq!(by_id.credential_digest, "digest");
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_row() {
        let replica = LocalReplicaStore::in_memory().await.unwrap();
        replica.upsert_remote(&doc("u1", "ana@loja.com")).await.unwrap();
        // Warm the cache so the update must invalidate it
        replica.find_by_id(&ProfileId::new("u1")).await.unwrap();

        let mut updated = doc("u1", "ana@loja.com");
        updated.display_name = Some("Ana".to_owned());
        replica.upsert_remote(&updated).await.unwrap();

        let profile = replica.find_by_id(&ProfileId::new("u1")).await.unwrap().unwrap();
        assert_eq!(profile.display_name, "Ana");
    }

    #[tokio::test]
    async fn test_identifier_moved_to_new_account_keeps_one_row() {
        let replica = LocalReplicaStore::in_memory().await.unwrap();
        replica.upsert_remote(&doc("old", "ana@loja.com")).await.unwrap();
        replica.upsert_remote(&doc("new", "ana@loja.com")).await.unwrap();

        let identifier = LoginIdentifier::parse("ana@loja.com").unwrap();
        let profile = replica.find_by_identifier(&identifier).await.unwrap().unwrap();
        assert_eq!(profile.id.as_str(), "new");
        assert!(replica.find_by_id(&ProfileId::new("old")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offline_marker_holds_one_profile() {
        let replica = LocalReplicaStore::in_memory().await.unwrap();
        assert!(replica.offline_marker().await.unwrap().is_none());

        replica.set_offline_marker(&ProfileId::new("u1")).await.unwrap();
        replica.set_offline_marker(&ProfileId::new("u2")).await.unwrap();
        assert_eq!(
            replica.offline_marker().await.unwrap(),
            Some(ProfileId::new("u2"))
        );

        replica.clear_offline_marker().await.unwrap();
        assert!(replica.offline_marker().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_products_are_listed_per_business_by_name() {
        let replica = LocalReplicaStore::in_memory().await.unwrap();
        for (id, business, name) in [("p1", "b1", "Pão"), ("p2", "b1", "Café"), ("p3", "b2", "Bolo")] {
            replica
                .upsert_product(&CatalogItem {
                    product_id: ProductId::new(id),
                    business_id: BusinessId::new(business),
                    name: name.to_owned(),
                    unit_price: Money::from_cents(450),
                    cost_price: None,
                    quantity_on_hand: 10,
                    active: true,
                    updated_at: None,
                })
                .await
                .unwrap();
        }

        let names: Vec<_> = replica
            .list_products(&BusinessId::new("b1"))
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.name)
            .collect();
        assert_eq!(names, vec!["Café", "Pão"]);
        assert!(replica.find_product(&ProductId::new("p3")).await.unwrap().is_some());
    }
}
