//! Session state and its reducer.

use balcao_core::{Profile, SessionMode};

/// The terminal's login session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Anonymous,
    /// Verified against the local replica's credential digest.
    Offline(Profile),
    /// Verified by the remote identity provider.
    Authenticated(Profile),
}

impl Session {
    #[must_use]
    pub const fn mode(&self) -> SessionMode {
        match self {
            Self::Anonymous => SessionMode::Anonymous,
            Self::Offline(_) => SessionMode::Offline,
            Self::Authenticated(_) => SessionMode::Authenticated,
        }
    }

    /// The logged-in profile, if any.
    #[must_use]
    pub const fn principal(&self) -> Option<&Profile> {
        match self {
            Self::Anonymous => None,
            Self::Offline(profile) | Self::Authenticated(profile) => Some(profile),
        }
    }
}

/// Everything that can move the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The identity provider reports a signed-in principal.
    RemoteSignedIn(Profile),
    /// The identity provider reports no principal.
    RemoteSignedOut,
    /// A persisted offline session was restored at boot.
    OfflineRestored(Profile),
    /// A replica-verified login.
    OfflineLogin(Profile),
    /// Newer data for the current principal, such as updated usage.
    PrincipalRefreshed(Profile),
    /// Explicit logout.
    LoggedOut,
}

/// Compute the session that follows `event`.
///
/// Pure; the controller is the only caller that stores the result.
#[must_use]
pub fn reduce(session: &Session, event: SessionEvent) -> Session {
    match (session, event) {
        (_, SessionEvent::RemoteSignedIn(profile)) => Session::Authenticated(profile),

        // The remote provider never backed an offline session
        (Session::Offline(_), SessionEvent::RemoteSignedOut) => session.clone(),
        (_, SessionEvent::RemoteSignedOut | SessionEvent::LoggedOut) => Session::Anonymous,

        (_, SessionEvent::OfflineRestored(profile) | SessionEvent::OfflineLogin(profile)) => {
            Session::Offline(profile)
        }

        (Session::Offline(current), SessionEvent::PrincipalRefreshed(profile))
            if current.id == profile.id =>
        {
            Session::Offline(profile)
        }
        (Session::Authenticated(current), SessionEvent::PrincipalRefreshed(profile))
            if current.id == profile.id =>
        {
            Session::Authenticated(profile)
        }
        (_, SessionEvent::PrincipalRefreshed(_)) => session.clone(),
    }
}

/// Notified synchronously after every session transition.
pub trait SessionObserver: Send + Sync {
    fn session_changed(&self, session: &Session);
}
