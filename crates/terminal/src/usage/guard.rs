//! Session-bound plan guard.

use std::sync::{PoisonError, RwLock};

use balcao_core::Profile;

use super::{Feature, QuotaNotice, UsageError, UsageMeter, UsageUpdate};
use crate::auth::{Session, SessionObserver};

/// Holds the logged-in principal for plan checks.
///
/// Registered as a [`SessionObserver`], so every session transition
/// re-binds it. After an order is recorded, [`PlanGuard::record`] keeps the
/// bound profile's counter current until the next transition.
#[derive(Debug, Default)]
pub struct PlanGuard {
    principal: RwLock<Option<Profile>>,
}

impl PlanGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The bound principal.
    #[must_use]
    pub fn principal(&self) -> Option<Profile> {
        self.principal
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The bound principal, or `UsageError::NoActivePrincipal`.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::NoActivePrincipal` when nobody is logged in.
    pub fn require_principal(&self) -> Result<Profile, UsageError> {
        self.principal().ok_or(UsageError::NoActivePrincipal)
    }

    /// Quota check for the bound principal.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::NoActivePrincipal` when nobody is logged in and
    /// `UsageError::PlanLimitExceeded` when the allowance is used up.
    pub fn check(&self, meter: &UsageMeter) -> Result<QuotaNotice, UsageError> {
        meter.check_order_allowed(&self.require_principal()?)
    }

    /// Feature check for the bound principal; `false` when logged out.
    #[must_use]
    pub fn has_feature(&self, meter: &UsageMeter, feature: Feature) -> bool {
        self.principal()
            .is_some_and(|profile| meter.has_feature(&profile, feature))
    }

    /// Apply a recorded usage update to the bound principal.
    pub fn record(&self, update: &UsageUpdate) {
        let mut principal = self
            .principal
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(profile) = principal.as_mut() {
            *profile = update.apply_to(profile);
        }
    }
}

impl SessionObserver for PlanGuard {
    fn session_changed(&self, session: &Session) {
        *self
            .principal
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session.principal().cloned();
    }
}
