//! Integration tests for the Balcão terminal core.
//!
//! Each scenario runs one or more fully wired [`Terminal`]s against a
//! shared in-memory remote store, so checkout, session and usage paths are
//! exercised end to end without a database or network.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p balcao-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `checkout_flow` - Login, catalog and checkout on one terminal
//! - `concurrent_commits` - Several terminals selling the same stock
//! - `offline_session` - Offline login, fallback and restoration at boot
//! - `usage_rollover` - Plan allowance across a month boundary

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use secrecy::SecretString;

use balcao_core::{
    BusinessId, CartLine, CatalogItem, LoginIdentifier, Money, Payment, PaymentMethod, ProductId,
};
use balcao_terminal::clock::FixedClock;
use balcao_terminal::identity::MemoryIdentityProvider;
use balcao_terminal::network::StaticProbe;
use balcao_terminal::store::memory::MemoryStore;
use balcao_terminal::store::{RemoteMonthlyOrders, RemoteProfileDocument, RemoteSubscription};
use balcao_terminal::{
    CommitRequest, Components, LocalReplicaStore, PlanTable, RetryPolicy, Settings, Terminal,
};

pub const BUSINESS: &str = "b1";
pub const CASHIER_ID: &str = "u1";
pub const CASHIER_EMAIL: &str = "ana@loja.com";
pub const REMOTE_PASSWORD: &str = "remote-pw";
pub const OFFLINE_DIGEST: &str = "digest-1";

/// 2025-05-20 12:00 UTC.
#[must_use]
pub fn may_20() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 20, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

/// 2025-06-01 09:00 UTC.
#[must_use]
pub fn june_1() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0)
        .single()
        .unwrap_or_default()
}

#[must_use]
pub fn product(id: &str, name: &str, price: i64, quantity: i64) -> CatalogItem {
    CatalogItem {
        product_id: ProductId::new(id),
        business_id: BusinessId::new(BUSINESS),
        name: name.to_owned(),
        unit_price: Money::from_units(price),
        cost_price: None,
        quantity_on_hand: quantity,
        active: true,
        updated_at: None,
    }
}

/// The cashier's remote profile on `plan`, with `usage` as `(month, count)`.
#[must_use]
pub fn cashier(plan: &str, usage: Option<(&str, u32)>) -> RemoteProfileDocument {
    let mut doc = RemoteProfileDocument::new(CASHIER_ID, CASHIER_EMAIL);
    doc.display_name = Some("Ana".to_owned());
    doc.business_id = Some(BUSINESS.to_owned());
    doc.credential_digest = Some(OFFLINE_DIGEST.to_owned());
    doc.subscription = Some(RemoteSubscription {
        plan_id: Some(plan.to_owned()),
        status: Some("active".to_owned()),
        monthly_orders: usage.map(|(month, count)| RemoteMonthlyOrders {
            month: Some(month.to_owned()),
            count: Some(count),
        }),
    });
    doc
}

/// A cash sale of `quantity` units of `product` at `price`, paid exactly.
#[must_use]
pub fn cash_sale(product: &str, price: i64, quantity: u32) -> CommitRequest {
    let line = CartLine::new(product, Money::from_units(price), quantity);
    let total = line.total();
    CommitRequest::new(
        BUSINESS,
        vec![line],
        vec![Payment::new(PaymentMethod::Cash, total)],
    )
}

#[must_use]
pub fn secret(value: &str) -> SecretString {
    SecretString::from(value)
}

/// One terminal and the handles a scenario needs to steer it.
pub struct Fixture {
    pub store: MemoryStore,
    pub probe: Arc<StaticProbe>,
    pub provider: Arc<MemoryIdentityProvider>,
    pub clock: Arc<FixedClock>,
    pub replica: LocalReplicaStore,
    pub terminal: Terminal,
}

impl Fixture {
    /// A terminal over a fresh store seeded with the cashier on `basic`
    /// and five units of `p1` at 10.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory replica cannot be opened.
    pub async fn new(online: bool) -> Self {
        let store = MemoryStore::new();
        store.insert_profile(cashier("basic", None)).await;
        store.insert_product(product("p1", "Coxinha", 10, 5)).await;
        Self::on_store(store, online).await
    }

    /// Another terminal on an existing store, with its own replica.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory replica cannot be opened.
    pub async fn on_store(store: MemoryStore, online: bool) -> Self {
        let replica = LocalReplicaStore::in_memory()
            .await
            .expect("in-memory replica");
        Self::with_replica(store, replica, online).await
    }

    /// A terminal reusing `replica`, as after a restart.
    ///
    /// # Panics
    ///
    /// Panics if the cashier's email does not parse.
    pub async fn with_replica(store: MemoryStore, replica: LocalReplicaStore, online: bool) -> Self {
        let probe = Arc::new(StaticProbe::new(online));
        let provider = Arc::new(MemoryIdentityProvider::new().with_account(
            CASHIER_ID,
            LoginIdentifier::parse(CASHIER_EMAIL).expect("valid email"),
            REMOTE_PASSWORD,
        ));
        let clock = Arc::new(FixedClock::new(may_20()));

        let terminal = Terminal::assemble(Components {
            transactional: Arc::new(store.clone()),
            profiles: Arc::new(store.clone()),
            products: Arc::new(store.clone()),
            probe: Arc::clone(&probe) as _,
            provider: Arc::clone(&provider) as _,
            replica: replica.clone(),
            clock: Arc::clone(&clock) as _,
            plans: PlanTable::builtin(),
            settings: Settings {
                retry: RetryPolicy::with_max_attempts(8),
                ..Settings::default()
            },
        });
        terminal.monitor.probe().await;

        Self {
            store,
            probe,
            provider,
            clock,
            replica,
            terminal,
        }
    }

    /// Flip connectivity for both the probe and the identity provider, and
    /// let the monitor observe it.
    pub async fn set_online(&self, online: bool) {
        self.probe.set(online);
        self.provider.set_reachable(online);
        self.terminal.monitor.probe().await;
    }
}
