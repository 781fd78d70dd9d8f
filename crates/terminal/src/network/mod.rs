//! Network health monitoring.
//!
//! The operating system's "online" flag only says a network interface is
//! up. [`NetworkHealthMonitor`] instead probes real endpoints and publishes
//! [`NetworkStatus`] from the outcome. Status changes only when a probe
//! disagrees with the current value, and listeners hear about each
//! transition exactly once, in probe-completion order.
//!
//! # Example
//!
//! ```rust,ignore
//! let monitor = Arc::new(NetworkHealthMonitor::new(probe, timeout, interval));
//! monitor.on_change(|status| tracing::info!(%status, "network changed"));
//! let poller = Arc::clone(&monitor).spawn();
//! monitor.wait_until_hydrated().await;
//! ```

pub mod probe;

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use balcao_core::NetworkStatus;

pub use probe::{HttpProbe, ReachabilityProbe, StaticProbe};

/// Default hard timeout for one probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(4);

/// Default interval between background probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Callback invoked on every status transition.
pub type StatusListener = Arc<dyn Fn(NetworkStatus) + Send + Sync>;

/// Probes reachability and publishes [`NetworkStatus`].
pub struct NetworkHealthMonitor {
    probe: Arc<dyn ReachabilityProbe>,
    timeout: Duration,
    interval: Duration,
    /// `None` until the first probe completes.
    status: watch::Sender<Option<NetworkStatus>>,
    listeners: RwLock<Vec<StatusListener>>,
    /// Held for the whole of a probe so outcomes publish in order.
    probing: Mutex<()>,
    wake: Notify,
}

impl std::fmt::Debug for NetworkHealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkHealthMonitor")
            .field("status", &*self.status.borrow())
            .field("timeout", &self.timeout)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl NetworkHealthMonitor {
    /// Create a monitor. No probe runs until [`probe`](Self::probe),
    /// [`refresh`](Self::refresh) or [`spawn`](Self::spawn) is called.
    #[must_use]
    pub fn new(probe: Arc<dyn ReachabilityProbe>, timeout: Duration, interval: Duration) -> Self {
        let (status, _) = watch::channel(None);
        Self {
            probe,
            timeout,
            interval,
            status,
            listeners: RwLock::new(Vec::new()),
            probing: Mutex::new(()),
            wake: Notify::new(),
        }
    }

    /// Run one probe and publish its outcome.
    ///
    /// A probe that errors or outlives the timeout counts as `Offline`.
    /// Never fails.
    pub async fn probe(&self) -> NetworkStatus {
        let _serial = self.probing.lock().await;

        let reachable = tokio::time::timeout(self.timeout, self.probe.check())
            .await
            .unwrap_or_else(|_| {
                debug!(timeout_ms = self.timeout.as_millis(), "probe timed out");
                false
            });

        let status = if reachable {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        };
        self.publish(status);
        status
    }

    /// Re-probe now. Alias of [`probe`](Self::probe) for callers reacting
    /// to a user action.
    pub async fn refresh(&self) -> NetworkStatus {
        self.probe().await
    }

    /// Ask the background loop to probe immediately.
    ///
    /// Platform online/offline events land here; they never set the
    /// status directly.
    pub fn trigger(&self) {
        self.wake.notify_one();
    }

    fn publish(&self, status: NetworkStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == Some(status) {
                false
            } else {
                *current = Some(status);
                true
            }
        });

        if !changed {
            return;
        }

        info!(%status, "network status changed");
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(status);
        }
    }

    /// The last published status; `Offline` before the first probe.
    #[must_use]
    pub fn current_status(&self) -> NetworkStatus {
        self.status.borrow().unwrap_or_default()
    }

    /// Whether at least one probe has completed.
    #[must_use]
    pub fn is_hydrated(&self) -> bool {
        self.status.borrow().is_some()
    }

    /// Resolve once the first probe has completed, returning the status.
    pub async fn wait_until_hydrated(&self) -> NetworkStatus {
        let mut rx = self.status.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(status) => status.unwrap_or_default(),
            // The sender lives in `self`, so the channel cannot close here
            Err(_) => NetworkStatus::Offline,
        }
    }

    /// Watch the status. The value is `None` until hydration.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<NetworkStatus>> {
        self.status.subscribe()
    }

    /// Register a listener for status transitions.
    ///
    /// Listeners run synchronously on the probing task and must not block.
    pub fn on_change(&self, listener: impl Fn(NetworkStatus) + Send + Sync + 'static) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Start the background poll loop: one probe right away, then one per
    /// interval and one per [`trigger`](Self::trigger).
    ///
    /// Abort the returned handle to stop polling.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = self.wake.notified() => {
                        debug!("probe triggered");
                        ticker.reset();
                    }
                }
                self.probe().await;
            }
        })
    }
}
