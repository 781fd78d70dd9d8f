//! Remote identity provider.
//!
//! The provider authenticates a login identifier and secret and reports the
//! signed-in identity through a watch channel, which is how the session
//! controller learns about sign-ins and sign-outs that happen elsewhere
//! (token expiry, another tab, an admin revoking the account).
//!
//! # Implementations
//!
//! - [`http::HttpIdentityProvider`] - password sign-in over a REST endpoint
//! - [`memory::MemoryIdentityProvider`] - in-process accounts for tests

pub mod http;
pub mod memory;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::watch;

use balcao_core::{LoginIdentifier, ProfileId};

pub use http::HttpIdentityProvider;
pub use memory::MemoryIdentityProvider;

/// A principal the provider has authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Provider user id; doubles as the `users/{id}` profile key.
    pub uid: ProfileId,
    pub identifier: LoginIdentifier,
}

/// Errors from the identity provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The identifier is unknown or the secret is wrong.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The provider could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The provider answered with something other than a credential verdict.
    #[error("identity provider error: {0}")]
    Provider(String),
}

impl ProviderError {
    /// Whether this failure means "no connectivity" rather than a verdict.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Remote authentication.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authenticate and make the identity current.
    async fn sign_in(
        &self,
        identifier: &LoginIdentifier,
        secret: &SecretString,
    ) -> Result<Identity, ProviderError>;

    /// Drop the current identity.
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// The identity currently signed in, if any.
    fn current_identity(&self) -> Option<Identity>;

    /// Watch identity changes.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}
