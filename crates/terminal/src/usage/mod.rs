//! Plan usage metering.
//!
//! [`UsageMeter`] answers plan questions about a profile (feature access,
//! orders left this month) and records completed orders against the
//! profile's monthly counter. Read-side checks are pure functions of the
//! profile and the clock; only [`UsageMeter::record_order`] writes.
//!
//! [`PlanGuard`] binds the meter to whoever is logged in. It observes the
//! session controller, so it always holds the current principal without any
//! process-wide state.

pub mod guard;
pub mod plan;

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use balcao_core::{MonthKey, MonthlyUsage, Profile, SubscriptionStatus};

use crate::clock::Clock;
use crate::store::{ProfileSource, StoreError};

pub use guard::PlanGuard;
pub use plan::{Feature, OrderLimit, Plan, PlanError, PlanTable};

/// Usage percentage at which the cashier is warned.
pub const ADVISORY_THRESHOLD_PERCENT: u8 = 80;

/// Errors from usage checks and recording.
#[derive(Debug, Error)]
pub enum UsageError {
    /// The plan's monthly order allowance is used up.
    #[error("monthly order limit reached ({used}/{limit})")]
    PlanLimitExceeded { used: u32, limit: u32 },

    /// Nobody is logged in.
    #[error("no active session")]
    NoActivePrincipal,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a quota check that did not block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaNotice {
    Clear,
    /// At or past the advisory threshold but still allowed.
    NearLimit { used: u32, limit: u32, percentage: u8 },
}

/// Counter and status written by [`UsageMeter::record_order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageUpdate {
    pub usage: MonthlyUsage,
    pub status: SubscriptionStatus,
}

impl UsageUpdate {
    /// `profile` with this update applied.
    #[must_use]
    pub fn apply_to(&self, profile: &Profile) -> Profile {
        Profile {
            monthly_usage: Some(self.usage),
            subscription_status: self.status,
            ..profile.clone()
        }
    }
}

/// Plan-scoped monthly order counter.
pub struct UsageMeter {
    plans: Arc<PlanTable>,
    clock: Arc<dyn Clock>,
    profiles: Arc<dyn ProfileSource>,
}

impl std::fmt::Debug for UsageMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageMeter")
            .field("plans", &self.plans)
            .finish_non_exhaustive()
    }
}

impl UsageMeter {
    #[must_use]
    pub fn new(
        plans: Arc<PlanTable>,
        clock: Arc<dyn Clock>,
        profiles: Arc<dyn ProfileSource>,
    ) -> Self {
        Self {
            plans,
            clock,
            profiles,
        }
    }

    /// The plan table in use.
    #[must_use]
    pub fn plans(&self) -> &PlanTable {
        &self.plans
    }

    /// The month orders are currently counted toward.
    #[must_use]
    pub fn current_month(&self) -> MonthKey {
        MonthKey::of(&self.clock.now())
    }

    #[must_use]
    pub fn has_feature(&self, profile: &Profile, feature: Feature) -> bool {
        self.plans.get(&profile.plan_id).has_feature(feature)
    }

    /// Orders recorded this month; a counter from another month is zero.
    #[must_use]
    pub fn orders_this_month(&self, profile: &Profile) -> u32 {
        profile.orders_in(self.current_month())
    }

    #[must_use]
    pub fn can_record_order(&self, profile: &Profile) -> bool {
        match self.plans.get(&profile.plan_id).monthly_order_limit {
            OrderLimit::Unlimited => true,
            OrderLimit::Limited(limit) => self.orders_this_month(profile) < limit,
        }
    }

    /// Share of the monthly allowance used, 0 to 100. Unlimited plans are
    /// always at 0.
    #[must_use]
    pub fn usage_percentage(&self, profile: &Profile) -> u8 {
        match self.plans.get(&profile.plan_id).monthly_order_limit {
            OrderLimit::Unlimited => 0,
            OrderLimit::Limited(0) => 100,
            OrderLimit::Limited(limit) => {
                let used = u64::from(self.orders_this_month(profile));
                let percent = (used * 100 / u64::from(limit)).min(100);
                u8::try_from(percent).unwrap_or(100)
            }
        }
    }

    /// Decide whether one more order may be taken.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::PlanLimitExceeded` once the allowance is used up.
    pub fn check_order_allowed(&self, profile: &Profile) -> Result<QuotaNotice, UsageError> {
        let OrderLimit::Limited(limit) = self.plans.get(&profile.plan_id).monthly_order_limit
        else {
            return Ok(QuotaNotice::Clear);
        };

        let used = self.orders_this_month(profile);
        if used >= limit {
            return Err(UsageError::PlanLimitExceeded { used, limit });
        }

        let percentage = self.usage_percentage(profile);
        if percentage >= ADVISORY_THRESHOLD_PERCENT {
            return Ok(QuotaNotice::NearLimit {
                used,
                limit,
                percentage,
            });
        }
        Ok(QuotaNotice::Clear)
    }

    /// The counter and status that recording one more order produces.
    #[must_use]
    pub fn next_usage(&self, profile: &Profile) -> UsageUpdate {
        let month = self.current_month();
        let count = profile.orders_in(month).saturating_add(1);

        let status = match self.plans.get(&profile.plan_id).monthly_order_limit {
            OrderLimit::Limited(limit) if count >= limit => SubscriptionStatus::Overdue,
            _ => SubscriptionStatus::Active,
        };

        UsageUpdate {
            usage: MonthlyUsage { month, count },
            status,
        }
    }

    /// Count one order against `profile` in the remote store.
    ///
    /// A new month starts the counter at 1 in the same write.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::Store` if the remote update fails.
    #[instrument(skip(self, profile), fields(profile_id = %profile.id))]
    pub async fn record_order(&self, profile: &Profile) -> Result<UsageUpdate, UsageError> {
        let update = self.next_usage(profile);
        self.profiles
            .update_usage(&profile.id, update.usage, update.status)
            .await?;

        info!(
            month = %update.usage.month,
            count = update.usage.count,
            status = update.status.as_str(),
            "order recorded"
        );
        Ok(update)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use balcao_core::{BusinessId, LoginIdentifier, PlanId, ProfileId, Role};

    use crate::clock::FixedClock;
    use crate::store::RemoteProfileDocument;
    use crate::store::memory::MemoryStore;

    use super::*;

    fn profile(plan: &str, usage: Option<(&str, u32)>) -> Profile {
        Profile {
            id: ProfileId::new("u1"),
            display_name: "Ana".to_owned(),
            identifier: LoginIdentifier::parse("ana@loja.com").unwrap(),
            role: Role::Owner,
            business_id: BusinessId::new("b1"),
            plan_id: PlanId::new(plan),
            credential_digest: String::new(),
            subscription_status: SubscriptionStatus::Active,
            monthly_usage: usage.map(|(month, count)| MonthlyUsage {
                month: MonthKey::parse(month).unwrap(),
                count,
            }),
            created_at: None,
            updated_at: None,
        }
    }

    async fn meter_at(year: i32, month: u32, day: u32) -> (UsageMeter, MemoryStore) {
        let store = MemoryStore::new();
        store
            .insert_profile(RemoteProfileDocument::new("u1", "ana@loja.com"))
            .await;
        let clock = FixedClock::new(Utc.with_ymd_and_hms(year, month, day, 15, 0, 0).unwrap());
        let meter = UsageMeter::new(
            Arc::new(PlanTable::builtin()),
            Arc::new(clock),
            Arc::new(store.clone()),
        );
        (meter, store)
    }

    #[tokio::test]
    async fn test_last_order_of_the_month_marks_overdue() {
        let (meter, store) = meter_at(2025, 5, 20).await;
        let update = meter
            .record_order(&profile("basic", Some(("2025-05", 199))))
            .await
            .unwrap();

        assert_eq!(update.usage.month.to_string(), "2025-05");
        assert_eq!(update.usage.count, 200);
        assert_eq!(update.status, SubscriptionStatus::Overdue);

        let doc = store.profile(&ProfileId::new("u1")).await.unwrap();
        let orders = doc.subscription.unwrap().monthly_orders.unwrap();
        assert_eq!(orders.count, Some(200));
    }

    #[tokio::test]
    async fn test_new_month_restarts_at_one() {
        let (meter, store) = meter_at(2025, 6, 1).await;
        let update = meter
            .record_order(&profile("basic", Some(("2025-05", 199))))
            .await
            .unwrap();

        assert_eq!(update.usage.month.to_string(), "2025-06");
        assert_eq!(update.usage.count, 1);
        assert_eq!(update.status, SubscriptionStatus::Active);

        let doc = store.profile(&ProfileId::new("u1")).await.unwrap();
        let subscription = doc.subscription.unwrap();
        assert_eq!(subscription.status.as_deref(), Some("active"));
        assert_eq!(
            subscription.monthly_orders.unwrap().month.as_deref(),
            Some("2025-06")
        );
    }

    #[tokio::test]
    async fn test_stale_month_counts_as_zero_for_checks() {
        let (meter, _) = meter_at(2025, 6, 1).await;
        let stale = profile("basic", Some(("2025-05", 200)));

        assert!(meter.can_record_order(&stale));
        assert_eq!(meter.usage_percentage(&stale), 0);
        assert_eq!(meter.check_order_allowed(&stale).unwrap(), QuotaNotice::Clear);
    }

    #[tokio::test]
    async fn test_advisory_notice_at_eighty_percent() {
        let (meter, _) = meter_at(2025, 5, 20).await;

        let notice = meter
            .check_order_allowed(&profile("basic", Some(("2025-05", 160))))
            .unwrap();
        assert_eq!(
            notice,
            QuotaNotice::NearLimit {
                used: 160,
                limit: 200,
                percentage: 80
            }
        );

        let clear = meter
            .check_order_allowed(&profile("basic", Some(("2025-05", 159))))
            .unwrap();
        assert_eq!(clear, QuotaNotice::Clear);
    }

    #[tokio::test]
    async fn test_hard_block_at_limit() {
        let (meter, _) = meter_at(2025, 5, 20).await;
        let full = profile("free", Some(("2025-05", 30)));

        assert!(!meter.can_record_order(&full));
        assert_eq!(meter.usage_percentage(&full), 100);
        assert!(matches!(
            meter.check_order_allowed(&full),
            Err(UsageError::PlanLimitExceeded { used: 30, limit: 30 })
        ));
    }

    #[tokio::test]
    async fn test_unlimited_plan_is_never_blocked() {
        let (meter, _) = meter_at(2025, 5, 20).await;
        let busy = profile("premium", Some(("2025-05", 50_000)));

        assert!(meter.can_record_order(&busy));
        assert_eq!(meter.usage_percentage(&busy), 0);
        assert_eq!(meter.next_usage(&busy).status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn test_features_follow_plan() {
        let (meter, _) = meter_at(2025, 5, 20).await;
        assert!(meter.has_feature(&profile("pro", None), Feature::Delivery));
        assert!(!meter.has_feature(&profile("basic", None), Feature::Delivery));
    }

    #[tokio::test]
    async fn test_record_order_propagates_store_failure() {
        let (meter, store) = meter_at(2025, 5, 20).await;
        store.set_unavailable(true).await;
        let err = meter.record_order(&profile("basic", None)).await.unwrap_err();
        assert!(matches!(err, UsageError::Store(StoreError::Unavailable(_))));
    }
}
