//! In-process identity provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;

use balcao_core::{LoginIdentifier, ProfileId};

use super::{Identity, IdentityProvider, ProviderError};

#[derive(Debug)]
struct Account {
    uid: ProfileId,
    secret: SecretString,
}

/// Identity provider with a fixed set of accounts and a connectivity switch.
#[derive(Debug)]
pub struct MemoryIdentityProvider {
    accounts: HashMap<LoginIdentifier, Account>,
    reachable: AtomicBool,
    identity: watch::Sender<Option<Identity>>,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityProvider {
    /// A reachable provider with no accounts.
    #[must_use]
    pub fn new() -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            accounts: HashMap::new(),
            reachable: AtomicBool::new(true),
            identity,
        }
    }

    /// Add an account.
    #[must_use]
    pub fn with_account(
        mut self,
        uid: impl Into<ProfileId>,
        identifier: LoginIdentifier,
        secret: &str,
    ) -> Self {
        self.accounts.insert(
            identifier,
            Account {
                uid: uid.into(),
                secret: SecretString::from(secret),
            },
        );
        self
    }

    /// Simulate losing or regaining connectivity.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Simulate an identity change that did not go through `sign_in`,
    /// such as a restored token or a remote revocation.
    pub fn push_identity(&self, identity: Option<Identity>) {
        self.identity.send_replace(identity);
    }

    fn ensure_reachable(&self) -> Result<(), ProviderError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::Network("provider unreachable".to_owned()))
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(
        &self,
        identifier: &LoginIdentifier,
        secret: &SecretString,
    ) -> Result<Identity, ProviderError> {
        self.ensure_reachable()?;

        let account = self
            .accounts
            .get(identifier)
            .filter(|account| account.secret.expose_secret() == secret.expose_secret())
            .ok_or(ProviderError::InvalidCredentials)?;

        let identity = Identity {
            uid: account.uid.clone(),
            identifier: identifier.clone(),
        };
        self.identity.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.ensure_reachable()?;
        self.identity.send_replace(None);
        Ok(())
    }

    fn current_identity(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }
}
