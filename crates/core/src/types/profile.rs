//! Staff profile record.

use serde::{Deserialize, Serialize};

use super::{BusinessId, LoginIdentifier, MonthKey, PlanId, ProfileId, Role, SubscriptionStatus};

/// Orders recorded in one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyUsage {
    pub month: MonthKey,
    pub count: u32,
}

impl MonthlyUsage {
    /// Orders counted toward `month`; a counter for another month counts as zero.
    #[must_use]
    pub fn count_for(&self, month: MonthKey) -> u32 {
        if self.month == month { self.count } else { 0 }
    }
}

/// A staff member's profile in the canonical local shape.
///
/// The remote store owns the profile; the terminal keeps a normalized,
/// read-only copy in its replica. Timestamps are canonical RFC 3339 strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub display_name: String,
    /// Login identifier (usually the email address).
    pub identifier: LoginIdentifier,
    pub role: Role,
    pub business_id: BusinessId,
    pub plan_id: PlanId,
    /// Credential digest compared verbatim during offline login.
    pub credential_digest: String,
    pub subscription_status: SubscriptionStatus,
    pub monthly_usage: Option<MonthlyUsage>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Profile {
    /// Orders counted toward `month` for this profile.
    #[must_use]
    pub fn orders_in(&self, month: MonthKey) -> u32 {
        self.monthly_usage.map_or(0, |usage| usage.count_for(month))
    }
}
