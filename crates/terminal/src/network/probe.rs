//! Reachability probes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, HeaderValue};
use tracing::debug;
use url::Url;

/// A single check of whether the internet is reachable.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// `true` if a real request reached a remote host.
    async fn check(&self) -> bool;
}

/// Probes a list of endpoints with cache-busting `HEAD` requests.
///
/// Any HTTP response counts as reachable, whatever its status; only
/// transport failures count as unreachable. Endpoints are tried in order
/// and the first response wins.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    endpoints: Vec<Url>,
}

impl HttpProbe {
    /// Create a probe with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoints: Vec<Url>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client, endpoints })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn check(&self) -> bool {
        for endpoint in &self.endpoints {
            let result = self
                .client
                .head(endpoint.clone())
                .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
                .send()
                .await;

            match result {
                Ok(response) => {
                    debug!(%endpoint, status = %response.status(), "probe reached endpoint");
                    return true;
                }
                Err(e) => debug!(%endpoint, error = %e, "probe failed"),
            }
        }
        false
    }
}

/// A probe that reports a fixed answer until told otherwise.
///
/// For demos and tests that need to drive connectivity by hand.
#[derive(Debug)]
pub struct StaticProbe {
    reachable: AtomicBool,
}

impl StaticProbe {
    #[must_use]
    pub const fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    pub fn set(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReachabilityProbe for StaticProbe {
    async fn check(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_endpoints_is_unreachable() {
        let probe = HttpProbe::new(Vec::new(), Duration::from_millis(100)).unwrap();
        assert!(!probe.check().await);
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        // Port 9 (discard) is closed on loopback in any sane environment
        let endpoint = Url::parse("http://127.0.0.1:9/").unwrap();
        let probe = HttpProbe::new(vec![endpoint], Duration::from_millis(500)).unwrap();
        assert!(!probe.check().await);
    }
}
