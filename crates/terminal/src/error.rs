//! Unified error handling with Sentry integration.
//!
//! Every component returns its own error type. [`TerminalError`] gathers
//! them for the PDV layer, which shows [`TerminalError::user_message`] to
//! the cashier and calls [`TerminalError::report`] so that unexpected
//! failures reach Sentry. Expected outcomes (wrong password, no stock,
//! plan exhausted) are never reported.

use thiserror::Error;

use crate::auth::{AuthError, LoginOutcome, Session, SessionObserver};
use crate::catalog::CatalogError;
use crate::checkout::CheckoutError;
use crate::config::ConfigError;
use crate::replica::ReplicaError;
use crate::sale::CommitError;
use crate::store::StoreError;
use crate::telemetry::TelemetryError;
use crate::usage::{PlanError, UsageError};

/// Terminal-level error type.
#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    #[error("Commit error: {0}")]
    Commit(#[from] CommitError),

    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Replica error: {0}")]
    Replica(#[from] ReplicaError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Plan table error: {0}")]
    Plan(#[from] PlanError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for `TerminalError`.
pub type Result<T> = std::result::Result<T, TerminalError>;

const TRY_AGAIN: &str = "Something went wrong, please try again";

impl TerminalError {
    /// Whether this failure points at a bug or a broken dependency rather
    /// than an ordinary business outcome.
    #[must_use]
    pub const fn is_unexpected(&self) -> bool {
        match self {
            Self::Auth(e) => auth_unexpected(e),
            Self::Checkout(CheckoutError::Commit(e)) | Self::Commit(e) => commit_unexpected(e),
            Self::Checkout(CheckoutError::Usage(e)) | Self::Usage(e) => usage_unexpected(e),
            Self::Checkout(CheckoutError::CommitInFlight) => false,
            Self::Store(e) => store_unexpected(e),
            Self::Catalog(_)
            | Self::Replica(_)
            | Self::Config(_)
            | Self::Plan(_)
            | Self::Telemetry(_)
            | Self::Http(_)
            | Self::Internal(_) => true,
        }
    }

    /// Message safe to show the cashier. Internal details stay out.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(e) => auth_message(e).to_string(),
            Self::Checkout(CheckoutError::CommitInFlight) => {
                "This sale is already being completed".to_string()
            }
            Self::Checkout(CheckoutError::Commit(e)) | Self::Commit(e) => commit_message(e),
            Self::Checkout(CheckoutError::Usage(e)) | Self::Usage(e) => usage_message(e).to_string(),
            Self::Store(e) if e.is_unreachable() => {
                "No connection to the server, please try again".to_string()
            }
            _ => TRY_AGAIN.to_string(),
        }
    }

    /// Send unexpected failures to Sentry and the log.
    pub fn report(&self) {
        if !self.is_unexpected() {
            return;
        }
        let event_id = sentry::capture_error(self);
        tracing::error!(
            error = %self,
            sentry_event_id = %event_id,
            "Terminal error"
        );
    }
}

const fn store_unexpected(e: &StoreError) -> bool {
    !matches!(e, StoreError::Conflict(_) | StoreError::NotFound) && !e.is_unreachable()
}

const fn auth_unexpected(e: &AuthError) -> bool {
    match e {
        AuthError::InvalidCredentials
        | AuthError::OfflineRejected
        | AuthError::ProfileNotFound(_)
        | AuthError::Network(_) => false,
        AuthError::Provider(_) | AuthError::Replica(_) => true,
        AuthError::Store(e) => store_unexpected(e),
    }
}

const fn commit_unexpected(e: &CommitError) -> bool {
    match e {
        CommitError::Store(e) => store_unexpected(e),
        _ => false,
    }
}

const fn usage_unexpected(e: &UsageError) -> bool {
    match e {
        UsageError::Store(e) => store_unexpected(e),
        _ => false,
    }
}

const fn auth_message(e: &AuthError) -> &'static str {
    match e {
        AuthError::InvalidCredentials => "Wrong e-mail or password",
        AuthError::OfflineRejected => {
            "Connection lost, switched to offline mode: use your offline password"
        }
        AuthError::ProfileNotFound(_) => "This account has no profile yet",
        AuthError::Network(_) => "No connection, and no saved login for this account",
        _ => TRY_AGAIN,
    }
}

fn commit_message(e: &CommitError) -> String {
    match e {
        CommitError::Validation(v) => v.to_string(),
        CommitError::ProductNotFound(_) => "A product in the cart no longer exists".to_string(),
        CommitError::StockInsufficient {
            product_id,
            available,
            ..
        } => format!("Not enough stock for {product_id}: {available} left"),
        CommitError::TransactionConflict { .. } => {
            "The stock changed during the sale, please try again".to_string()
        }
        CommitError::Store(e) if e.is_unreachable() => {
            "No connection to the server, the sale was not completed".to_string()
        }
        CommitError::Store(_) => TRY_AGAIN.to_string(),
    }
}

const fn usage_message(e: &UsageError) -> &'static str {
    match e {
        UsageError::PlanLimitExceeded { .. } => {
            "Your plan's monthly order limit has been reached"
        }
        UsageError::NoActivePrincipal => "Please log in first",
        UsageError::Store(_) => TRY_AGAIN,
    }
}

/// Notice to show after a successful login, if any.
#[must_use]
pub const fn login_notice(outcome: &LoginOutcome) -> Option<&'static str> {
    match outcome {
        LoginOutcome::SwitchedOffline(_) => Some("Connection lost, signed in offline"),
        LoginOutcome::Offline(_) => Some("Signed in offline"),
        LoginOutcome::Online(_) => None,
    }
}

/// Keeps the Sentry user context in step with the session.
#[derive(Debug, Default)]
pub struct SentryUserScope;

impl SessionObserver for SentryUserScope {
    fn session_changed(&self, session: &Session) {
        let user = session.principal().map(|profile| sentry::User {
            id: Some(profile.id.to_string()),
            email: Some(profile.identifier.as_str().to_string()),
            ..Default::default()
        });
        sentry::configure_scope(|scope| scope.set_user(user));
    }
}
