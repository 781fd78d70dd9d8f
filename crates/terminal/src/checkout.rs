//! Checkout: quota gate, sale commit and usage recording.
//!
//! The committer only knows about stock and sales. [`CheckoutService`] is
//! what a PDV screen calls: it refuses double submission, blocks orders
//! past the plan allowance, commits, and then counts the order.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use balcao_core::SaleRecord;

use crate::auth::AuthModeController;
use crate::sale::{CommitError, CommitRequest, SaleCommitter};
use crate::usage::{PlanGuard, QuotaNotice, UsageError, UsageMeter, UsageUpdate};

/// Errors from [`CheckoutService::checkout`].
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Another checkout on this terminal has not finished.
    #[error("a sale is already being committed")]
    CommitInFlight,

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Commit(#[from] CommitError),
}

/// A completed checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub sale: SaleRecord,
    /// Quota state before this order was counted.
    pub notice: QuotaNotice,
    /// `None` when the sale went through but the usage counter could not
    /// be written.
    pub usage: Option<UsageUpdate>,
}

pub struct CheckoutService {
    committer: Arc<SaleCommitter>,
    meter: Arc<UsageMeter>,
    guard: Arc<PlanGuard>,
    controller: Arc<AuthModeController>,
    cart: Mutex<()>,
}

impl std::fmt::Debug for CheckoutService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutService")
            .field("in_flight", &self.cart.try_lock().is_err())
            .finish_non_exhaustive()
    }
}

impl CheckoutService {
    #[must_use]
    pub fn new(
        committer: Arc<SaleCommitter>,
        meter: Arc<UsageMeter>,
        guard: Arc<PlanGuard>,
        controller: Arc<AuthModeController>,
    ) -> Self {
        Self {
            committer,
            meter,
            guard,
            controller,
            cart: Mutex::new(()),
        }
    }

    /// Commit the cart for the logged-in principal and count the order.
    ///
    /// Counting is best-effort: once the sale is committed it is returned
    /// even if the usage write fails.
    ///
    /// # Errors
    ///
    /// - `CheckoutError::CommitInFlight` if a checkout is already running
    /// - `CheckoutError::Usage` when nobody is logged in or the plan's
    ///   monthly allowance is used up (nothing is committed)
    /// - `CheckoutError::Commit` when the sale itself fails
    #[instrument(skip(self, request), fields(business_id = %request.business_id))]
    pub async fn checkout(&self, request: &CommitRequest) -> Result<Checkout, CheckoutError> {
        let _cart = self
            .cart
            .try_lock()
            .map_err(|_| CheckoutError::CommitInFlight)?;

        let principal = self.guard.require_principal()?;
        let notice = self.guard.check(&self.meter)?;
        if let QuotaNotice::NearLimit {
            used,
            limit,
            percentage,
        } = notice
        {
            info!(used, limit, percentage, "plan allowance nearly used");
        }

        let sale = self.committer.commit(request).await?;

        let usage = match self.meter.record_order(&principal).await {
            Ok(update) => {
                self.guard.record(&update);
                self.controller.refresh_principal(update.apply_to(&principal));
                Some(update)
            }
            Err(e) => {
                // The sale stands; the counter is repaired out of band.
                warn!(
                    sale_id = %sale.id,
                    profile_id = %principal.id,
                    error = %e,
                    "sale committed but usage was not recorded"
                );
                None
            }
        };

        Ok(Checkout {
            sale,
            notice,
            usage,
        })
    }
}
