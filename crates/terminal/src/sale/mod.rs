//! Transactional sale commit.
//!
//! [`SaleCommitter::commit`] turns a cart into a completed sale in one
//! all-or-nothing store operation:
//!
//! 1. Read stock (quantity, version, name) for every distinct product
//! 2. Reject the whole sale if any product lacks stock
//! 3. Compute totals and change
//! 4. Write every stock decrement and the sale record together, each stock
//!    write conditional on the version read in step 1
//!
//! If another terminal wrote one of the products in between, the store
//! rejects the write set and the committer starts over from step 1 after a
//! jittered backoff. Only running out of attempts is reported.

pub mod error;
pub mod plan;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, instrument, warn};

use balcao_core::{ProductId, SaleRecord};

use crate::store::{StoreError, TransactionalStore};

pub use error::{CommitError, ValidationError};
pub use plan::{CommitRequest, Totals};

/// Default number of commit attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// How conflicting commits are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based): exponential, capped,
    /// with the upper half randomized so colliding terminals spread out.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let ceiling = self
            .base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay);

        let ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        if ceiling_ms < 2 {
            return ceiling;
        }
        let floor_ms = ceiling_ms / 2;
        Duration::from_millis(rand::rng().random_range(floor_ms..=ceiling_ms))
    }
}

/// Commits sales against the remote transactional store.
pub struct SaleCommitter {
    store: Arc<dyn TransactionalStore>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for SaleCommitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaleCommitter")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl SaleCommitter {
    #[must_use]
    pub fn new(store: Arc<dyn TransactionalStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Validate the request, decrement stock and record the sale atomically.
    ///
    /// # Errors
    ///
    /// - `CommitError::Validation` for malformed requests (nothing is read)
    /// - `CommitError::StockInsufficient` when a product lacks stock
    /// - `CommitError::ProductNotFound` for unknown products
    /// - `CommitError::TransactionConflict` when every attempt conflicted
    /// - `CommitError::Store` for any other store failure
    #[instrument(
        skip(self, request),
        fields(business_id = %request.business_id, lines = request.lines.len())
    )]
    pub async fn commit(&self, request: &CommitRequest) -> Result<SaleRecord, CommitError> {
        plan::validate(request)?;
        let totals = plan::totals(request);
        let payments = plan::settle_payments(&request.payments, totals.final_amount)?;
        let product_ids: Vec<ProductId> = plan::requested_quantities(&request.lines)
            .into_keys()
            .collect();

        let mut attempt = 0;
        loop {
            attempt += 1;

            let stock = self.store.read(&product_ids).await?;
            let writes = plan::plan_writes(request, &totals, &payments, &stock)?;

            match self.store.write_all(writes).await {
                Ok(sale) => {
                    info!(
                        sale_id = %sale.id,
                        final_amount = %sale.final_amount,
                        attempt,
                        "sale committed"
                    );
                    return Ok(sale);
                }
                Err(StoreError::Conflict(reason)) => {
                    if attempt >= self.retry.max_attempts {
                        warn!(attempts = attempt, %reason, "giving up on conflicting sale");
                        return Err(CommitError::TransactionConflict { attempts: attempt });
                    }
                    let delay = self.retry.backoff(attempt);
                    debug!(attempt, %reason, delay_ms = delay.as_millis(), "commit conflicted, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
