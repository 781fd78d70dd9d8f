//! Subscription plans.
//!
//! A plan grants a set of features and a monthly order allowance. The
//! built-in table covers the standard tiers; deployments can replace it
//! with a JSON file:
//!
//! ```json
//! [
//!   { "id": "free", "name": "Grátis", "monthly_order_limit": 30, "features": ["pdv"] },
//!   { "id": "premium", "name": "Premium", "monthly_order_limit": null, "features": ["pdv", "tables"] }
//! ]
//! ```
//!
//! A `null` limit means unlimited. The table must contain a `free` plan;
//! unknown plan ids fall back to it.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use balcao_core::PlanId;

use crate::replica::normalize::DEFAULT_PLAN_ID;

/// A gated capability of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Point-of-sale register.
    Pdv,
    Tables,
    Delivery,
    Marketing,
    Printing,
    Reports,
    Alerts,
    /// More than one staff login per business.
    MultiUser,
}

/// Monthly order allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<u32>", into = "Option<u32>")]
pub enum OrderLimit {
    Limited(u32),
    Unlimited,
}

impl From<Option<u32>> for OrderLimit {
    fn from(value: Option<u32>) -> Self {
        value.map_or(Self::Unlimited, Self::Limited)
    }
}

impl From<OrderLimit> for Option<u32> {
    fn from(value: OrderLimit) -> Self {
        match value {
            OrderLimit::Limited(n) => Some(n),
            OrderLimit::Unlimited => None,
        }
    }
}

/// A subscription tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub monthly_order_limit: OrderLimit,
    #[serde(default)]
    pub features: BTreeSet<Feature>,
}

impl Plan {
    fn new(id: &str, name: &str, limit: OrderLimit, features: &[Feature]) -> Self {
        Self {
            id: PlanId::new(id),
            name: name.to_owned(),
            monthly_order_limit: limit,
            features: features.iter().copied().collect(),
        }
    }

    #[must_use]
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}

/// Errors loading a plan table.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("could not read plan table: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid plan table: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("plan table has no `free` plan")]
    MissingDefault,
}

/// Plans by id.
#[derive(Debug, Clone)]
pub struct PlanTable {
    plans: HashMap<PlanId, Plan>,
    fallback: Plan,
}

impl Default for PlanTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PlanTable {
    /// The standard tiers: free (30), basic (200), pro (1000) and premium
    /// (unlimited).
    #[must_use]
    pub fn builtin() -> Self {
        use Feature::{Alerts, Delivery, Marketing, MultiUser, Pdv, Printing, Reports, Tables};

        let free = Plan::new(DEFAULT_PLAN_ID, "Grátis", OrderLimit::Limited(30), &[Pdv]);
        let plans = vec![
            free.clone(),
            Plan::new(
                "basic",
                "Básico",
                OrderLimit::Limited(200),
                &[Pdv, Tables, Printing, Reports],
            ),
            Plan::new(
                "pro",
                "Profissional",
                OrderLimit::Limited(1000),
                &[Pdv, Tables, Printing, Reports, Delivery, Marketing, Alerts],
            ),
            Plan::new(
                "premium",
                "Premium",
                OrderLimit::Unlimited,
                &[
                    Pdv, Tables, Printing, Reports, Delivery, Marketing, Alerts, MultiUser,
                ],
            ),
        ];

        Self {
            plans: plans.into_iter().map(|p| (p.id.clone(), p)).collect(),
            fallback: free,
        }
    }

    /// Parse a JSON array of plans.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::Parse` for malformed JSON and
    /// `PlanError::MissingDefault` if there is no `free` plan.
    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        let plans: Vec<Plan> = serde_json::from_str(json)?;
        let plans: HashMap<PlanId, Plan> = plans.into_iter().map(|p| (p.id.clone(), p)).collect();
        let fallback = plans
            .get(&PlanId::new(DEFAULT_PLAN_ID))
            .cloned()
            .ok_or(PlanError::MissingDefault)?;
        Ok(Self { plans, fallback })
    }

    /// Read a plan table from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `PlanError` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// The plan for `id`, or the free plan for unknown ids.
    #[must_use]
    pub fn get(&self, id: &PlanId) -> &Plan {
        self.plans.get(id).unwrap_or(&self.fallback)
    }
}
