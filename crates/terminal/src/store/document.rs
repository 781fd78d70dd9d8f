//! Remote profile document shapes.
//!
//! Profiles written by older dashboard versions are not uniform: timestamps
//! appear as native instants, ISO strings or `{seconds, nanoseconds}`
//! wrappers, and most fields may be missing. These types accept all of
//! them; [`crate::replica::normalize`] turns them into the canonical
//! [`balcao_core::Profile`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use balcao_core::ProfileId;

/// A timestamp in any of the shapes found in remote documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteTimestamp {
    /// A native instant (or an RFC 3339 string that parses as one).
    Native(DateTime<Utc>),
    /// Epoch-seconds wrapper, with or without leading underscores.
    Epoch {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "_nanoseconds")]
        nanoseconds: u32,
    },
    /// Any other string, parsed leniently during normalization.
    Text(String),
}

/// `subscription.monthlyOrders`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMonthlyOrders {
    #[serde(default)]
    pub month: Option<String>,
    #[serde(default)]
    pub count: Option<u32>,
}

/// `subscription`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSubscription {
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub monthly_orders: Option<RemoteMonthlyOrders>,
}

/// A `users/{id}` document as stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProfileDocument {
    pub id: ProfileId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub business_id: Option<String>,
    /// Legacy top-level plan id; `subscription.planId` takes precedence.
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub credential_digest: Option<String>,
    #[serde(default)]
    pub subscription: Option<RemoteSubscription>,
    #[serde(default)]
    pub created_at: Option<RemoteTimestamp>,
    #[serde(default)]
    pub updated_at: Option<RemoteTimestamp>,
}

impl RemoteProfileDocument {
    /// A document with only an id and an email; everything else absent.
    #[must_use]
    pub fn new(id: impl Into<ProfileId>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            email: Some(email.into()),
            role: None,
            business_id: None,
            plan_id: None,
            credential_digest: None,
            subscription: None,
            created_at: None,
            updated_at: None,
        }
    }
}
