//! Remote-to-local profile normalization.
//!
//! The replica stores one fixed shape. Every remote timestamp becomes an
//! RFC 3339 UTC string with millisecond precision, and absent fields take
//! the local schema's defaults.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use tracing::debug;

use balcao_core::{
    BusinessId, LoginIdentifier, MonthKey, MonthlyUsage, PlanId, Profile, Role,
    SubscriptionStatus,
};

use super::ReplicaError;
use crate::store::{RemoteProfileDocument, RemoteTimestamp};

/// Plan assumed for profiles that carry no plan id.
pub const DEFAULT_PLAN_ID: &str = "free";

/// Render an instant in the canonical replica form.
#[must_use]
pub fn canonical_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize any remote timestamp shape into the canonical string.
///
/// Returns `None` for values that cannot be interpreted.
#[must_use]
pub fn normalize_timestamp(timestamp: &RemoteTimestamp) -> Option<String> {
    let instant = match timestamp {
        RemoteTimestamp::Native(instant) => Some(*instant),
        RemoteTimestamp::Epoch {
            seconds,
            nanoseconds,
        } => DateTime::from_timestamp(*seconds, *nanoseconds),
        RemoteTimestamp::Text(text) => parse_lenient(text),
    };

    if instant.is_none() {
        debug!(?timestamp, "dropping unparseable remote timestamp");
    }
    instant.as_ref().map(canonical_instant)
}

fn parse_lenient(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant.with_timezone(&Utc));
    }
    // Offset-less ISO strings are taken as UTC
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Convert a remote profile document into the canonical local profile.
///
/// # Errors
///
/// Returns `ReplicaError::MissingField` if the document has no usable login
/// identifier; every other field has a default.
pub fn profile_from_remote(doc: &RemoteProfileDocument) -> Result<Profile, ReplicaError> {
    let identifier = non_empty(doc.email.as_ref())
        .and_then(|email| LoginIdentifier::parse(email).ok())
        .ok_or(ReplicaError::MissingField("email"))?;

    let display_name = non_empty(doc.display_name.as_ref())
        .map_or_else(|| identifier.as_str().to_owned(), str::to_owned);

    let role = non_empty(doc.role.as_ref())
        .and_then(|role| role.to_lowercase().parse::<Role>().ok())
        .unwrap_or_default();

    // An owner's business shares the owner's id
    let business_id = non_empty(doc.business_id.as_ref())
        .map_or_else(|| BusinessId::new(doc.id.as_str()), BusinessId::new);

    let subscription = doc.subscription.as_ref();

    let plan_id = subscription
        .and_then(|s| non_empty(s.plan_id.as_ref()))
        .or_else(|| non_empty(doc.plan_id.as_ref()))
        .map_or_else(|| PlanId::new(DEFAULT_PLAN_ID), PlanId::new);

    let subscription_status = subscription
        .and_then(|s| s.status.as_deref())
        .and_then(SubscriptionStatus::from_remote)
        .unwrap_or_default();

    let monthly_usage = subscription
        .and_then(|s| s.monthly_orders.as_ref())
        .and_then(|orders| {
            let month = MonthKey::parse(orders.month.as_deref()?).ok()?;
            Some(MonthlyUsage {
                month,
                count: orders.count.unwrap_or(0),
            })
        });

    Ok(Profile {
        id: doc.id.clone(),
        display_name,
        identifier,
        role,
        business_id,
        plan_id,
        credential_digest: doc.credential_digest.clone().unwrap_or_default(),
        subscription_status,
        monthly_usage,
        created_at: doc.created_at.as_ref().and_then(normalize_timestamp),
        updated_at: doc.updated_at.as_ref().and_then(normalize_timestamp),
    })
}
