//! Session controller errors.

use thiserror::Error;

use balcao_core::ProfileId;

use crate::identity::ProviderError;
use crate::replica::ReplicaError;
use crate::store::StoreError;

/// Errors from login, logout and session restoration.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong identifier or secret. Never used for connectivity failures.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Connectivity was lost during an online login and the replica did
    /// not accept the credentials either.
    #[error("offline and the credentials could not be verified locally")]
    OfflineRejected,

    /// Signed in remotely, but no profile document exists.
    #[error("no profile for {0}")]
    ProfileNotFound(ProfileId),

    /// The remote side could not be reached in time.
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("identity provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Replica(#[from] ReplicaError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Whether the failure is a connectivity problem.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Store(e) => e.is_unreachable(),
            _ => false,
        }
    }
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidCredentials => Self::InvalidCredentials,
            ProviderError::Network(msg) => Self::Network(msg),
            ProviderError::Provider(msg) => Self::Provider(msg),
        }
    }
}
