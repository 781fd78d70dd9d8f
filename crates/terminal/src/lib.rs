//! Balcão Terminal - offline-resilient session and sale-commit core.
//!
//! Everything a cash-register terminal needs below its UI: knowing whether
//! the internet is really reachable, logging the cashier in online or from
//! the local replica, metering plan usage, and committing sales against the
//! shared remote store without ever overselling stock.
//!
//! # Components
//!
//! - [`network`] - [`NetworkHealthMonitor`], reachability probing with hysteresis
//! - [`replica`] - [`LocalReplicaStore`], the `SQLite` copy of profiles and products
//! - [`auth`] - [`AuthModeController`], the anonymous / offline / authenticated machine
//! - [`usage`] - [`UsageMeter`] and [`PlanGuard`], monthly plan allowance
//! - [`sale`] - [`SaleCommitter`], optimistic all-or-nothing sale commit
//! - [`checkout`] - [`CheckoutService`], quota gate around the committer
//! - [`catalog`] - [`Catalog`], product lookups with replica fallback
//!
//! # Wiring
//!
//! [`Terminal::start`] builds the production graph from a [`TerminalConfig`]
//! (`PostgreSQL` remote store, HTTP probe and identity provider).
//! [`Terminal::assemble`] accepts any [`Components`], which is how tests run
//! the same graph against in-memory backends.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod network;
pub mod replica;
pub mod sale;
pub mod store;
pub mod telemetry;
pub mod usage;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, instrument};

pub use auth::{AuthModeController, AuthTimeouts, LoginOutcome, Session};
pub use catalog::{Catalog, CatalogOrigin, CatalogView};
pub use checkout::{Checkout, CheckoutError, CheckoutService};
pub use clock::{Clock, SystemClock};
pub use config::TerminalConfig;
pub use error::{Result, SentryUserScope, TerminalError};
pub use network::NetworkHealthMonitor;
pub use replica::LocalReplicaStore;
pub use sale::{CommitRequest, RetryPolicy, SaleCommitter};
pub use usage::{PlanGuard, PlanTable, UsageMeter};

use identity::{HttpIdentityProvider, IdentityProvider};
use network::{DEFAULT_POLL_INTERVAL, DEFAULT_PROBE_TIMEOUT, HttpProbe, ReachabilityProbe};
use store::postgres::PgStore;
use store::{ProductSource, ProfileSource, TransactionalStore};

/// Timing knobs shared by the components.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub probe_timeout: Duration,
    pub poll_interval: Duration,
    pub auth: AuthTimeouts,
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            auth: AuthTimeouts::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&TerminalConfig> for Settings {
    fn from(config: &TerminalConfig) -> Self {
        Self {
            probe_timeout: config.network.probe_timeout,
            poll_interval: config.network.poll_interval,
            auth: AuthTimeouts {
                boot: config.boot_timeout,
                login: config.login_timeout,
            },
            retry: RetryPolicy::with_max_attempts(config.commit_max_attempts),
        }
    }
}

/// The backends a [`Terminal`] is built from.
pub struct Components {
    pub transactional: Arc<dyn TransactionalStore>,
    pub profiles: Arc<dyn ProfileSource>,
    pub products: Arc<dyn ProductSource>,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub provider: Arc<dyn IdentityProvider>,
    pub replica: LocalReplicaStore,
    pub clock: Arc<dyn Clock>,
    pub plans: PlanTable,
    pub settings: Settings,
}

/// A fully wired terminal.
pub struct Terminal {
    pub monitor: Arc<NetworkHealthMonitor>,
    pub controller: Arc<AuthModeController>,
    pub meter: Arc<UsageMeter>,
    pub guard: Arc<PlanGuard>,
    pub committer: Arc<SaleCommitter>,
    pub checkout: CheckoutService,
    pub catalog: Catalog,
    pub replica: LocalReplicaStore,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("controller", &self.controller)
            .field("meter", &self.meter)
            .finish_non_exhaustive()
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        let task = self
            .monitor_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = task.take() {
            task.abort();
        }
    }
}

impl Terminal {
    /// Connect to the remote store and the replica and wire the production
    /// components.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be opened, an HTTP client cannot
    /// be built, or the plan table file is unreadable.
    #[instrument(skip(config))]
    pub async fn start(config: &TerminalConfig) -> Result<Self> {
        let store = Arc::new(PgStore::connect(&config.remote_database_url).await?);
        info!("Remote store connected");
        if config.run_migrations {
            store.migrate().await?;
            info!("Remote migrations applied");
        }

        let replica = LocalReplicaStore::open(&config.replica_url).await?;
        info!(url = %config.replica_url, "Replica opened");

        let probe = HttpProbe::new(
            config.network.probe_endpoints.clone(),
            config.network.probe_timeout,
        )?;
        let provider = HttpIdentityProvider::new(
            config.identity.endpoint.clone(),
            config.identity.api_key.clone(),
            config.login_timeout,
        )?;

        let plans = match &config.plans_file {
            Some(path) => PlanTable::load(path)?,
            None => PlanTable::builtin(),
        };

        Ok(Self::assemble(Components {
            transactional: Arc::clone(&store) as _,
            profiles: Arc::clone(&store) as _,
            products: store,
            probe: Arc::new(probe),
            provider: Arc::new(provider),
            replica,
            clock: Arc::new(SystemClock),
            plans,
            settings: Settings::from(config),
        }))
    }

    /// Wire the components together. Nothing runs until [`Terminal::boot`].
    #[must_use]
    pub fn assemble(components: Components) -> Self {
        let Components {
            transactional,
            profiles,
            products,
            probe,
            provider,
            replica,
            clock,
            plans,
            settings,
        } = components;

        let monitor = Arc::new(NetworkHealthMonitor::new(
            probe,
            settings.probe_timeout,
            settings.poll_interval,
        ));

        let controller = AuthModeController::new(
            Arc::clone(&monitor),
            provider,
            Arc::clone(&profiles),
            replica.clone(),
            settings.auth,
        );

        let guard = Arc::new(PlanGuard::new());
        controller.add_observer(Arc::clone(&guard) as _);
        controller.add_observer(Arc::new(SentryUserScope));

        let meter = Arc::new(UsageMeter::new(Arc::new(plans), clock, profiles));
        let committer = Arc::new(SaleCommitter::new(transactional, settings.retry));
        let checkout = CheckoutService::new(
            Arc::clone(&committer),
            Arc::clone(&meter),
            Arc::clone(&guard),
            Arc::clone(&controller),
        );
        let catalog = Catalog::new(Arc::clone(&monitor), products, replica.clone());

        Self {
            monitor,
            controller,
            meter,
            guard,
            committer,
            checkout,
            catalog,
            replica,
            monitor_task: Mutex::new(None),
        }
    }

    /// Start background probing and restore or prepare the session.
    ///
    /// # Errors
    ///
    /// Returns `TerminalError::Auth` if the replica cannot be read during
    /// session restoration.
    #[instrument(skip(self))]
    pub async fn boot(&self) -> Result<Session> {
        {
            let mut task = self
                .monitor_task
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if task.is_none() {
                *task = Some(Arc::clone(&self.monitor).spawn());
            }
        }

        let session = self.controller.boot().await?;
        info!(mode = ?session.mode(), "Terminal booted");
        Ok(session)
    }
}
