//! Password sign-in over a REST identity endpoint.
//!
//! Sends `{"email", "password", "returnSecureToken": true}` to the
//! configured sign-in URL with the project API key as the `key` query
//! parameter, and reads `localId` from the answer. Rejections come back as
//! `{"error": {"message": "INVALID_PASSWORD"}}` and similar.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, instrument, warn};
use url::Url;

use balcao_core::{LoginIdentifier, ProfileId};

use super::{Identity, IdentityProvider, ProviderError};

/// Provider messages that mean the credentials were rejected.
const CREDENTIAL_REJECTIONS: &[&str] = &[
    "EMAIL_NOT_FOUND",
    "INVALID_PASSWORD",
    "INVALID_LOGIN_CREDENTIALS",
    "INVALID_EMAIL",
    "USER_DISABLED",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Identity provider backed by a REST password sign-in endpoint.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    endpoint: Url,
    api_key: SecretString,
    identity: watch::Sender<Option<Identity>>,
}

impl std::fmt::Debug for HttpIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIdentityProvider")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpIdentityProvider {
    /// Create a provider for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: Url,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let (identity, _) = watch::channel(None);
        Ok(Self {
            client,
            endpoint,
            api_key,
            identity,
        })
    }
}

/// Map a transport error to the provider taxonomy.
fn classify(err: &reqwest::Error) -> ProviderError {
    if err.is_decode() {
        ProviderError::Provider(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}

/// Map a provider rejection message to the provider taxonomy.
fn classify_rejection(message: &str) -> ProviderError {
    // Messages may carry a suffix: "INVALID_PASSWORD : details"
    let code = message.split([' ', ':']).next().unwrap_or_default();
    if CREDENTIAL_REJECTIONS.contains(&code) {
        ProviderError::InvalidCredentials
    } else {
        ProviderError::Provider(message.to_owned())
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    #[instrument(skip(self, secret), fields(identifier = %identifier.as_str()))]
    async fn sign_in(
        &self,
        identifier: &LoginIdentifier,
        secret: &SecretString,
    ) -> Result<Identity, ProviderError> {
        let body = SignInRequest {
            email: identifier.as_str(),
            password: secret.expose_secret(),
            return_secure_token: true,
        };

        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| classify(&e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}"));
            if status.is_server_error() {
                warn!(%status, %message, "identity provider failed");
                return Err(ProviderError::Provider(message));
            }
            return Err(classify_rejection(&message));
        }

        let signed_in: SignInResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Provider(format!("unexpected sign-in response: {e}")))?;

        let identifier = signed_in
            .email
            .as_deref()
            .and_then(|email| LoginIdentifier::parse(email).ok())
            .unwrap_or_else(|| identifier.clone());

        let identity = Identity {
            uid: ProfileId::new(signed_in.local_id),
            identifier,
        };
        debug!(uid = %identity.uid, "signed in");
        self.identity.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        // Tokens are bearer-only; dropping them is the whole sign-out
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
