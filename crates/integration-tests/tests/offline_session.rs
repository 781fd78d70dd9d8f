//! Integration tests for offline login and session restoration.
//!
//! The replica only learns a profile from a successful remote read, so each
//! scenario first logs in online, then takes the terminal offline.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use balcao_core::{LoginIdentifier, ProductId, ProfileId, SessionMode};
use balcao_integration_tests::{
    CASHIER_EMAIL, CASHIER_ID, Fixture, OFFLINE_DIGEST, REMOTE_PASSWORD, cash_sale, secret,
};
use balcao_terminal::auth::AuthError;
use balcao_terminal::error::login_notice;
use balcao_terminal::identity::Identity;
use balcao_terminal::{LoginOutcome, Session, TerminalError};

/// Log in online once so the replica holds the cashier, then log out.
async fn replicated(online_afterwards: bool) -> Fixture {
    let fx = Fixture::new(true).await;
    fx.terminal
        .controller
        .login(CASHIER_EMAIL, &secret(REMOTE_PASSWORD))
        .await
        .unwrap();
    fx.terminal.controller.logout().await;
    if !online_afterwards {
        fx.set_online(false).await;
    }
    fx
}

// =============================================================================
// Offline Login
// =============================================================================

#[tokio::test]
async fn test_offline_login_against_replica() {
    let fx = replicated(false).await;

    let outcome = fx
        .terminal
        .controller
        .login(CASHIER_EMAIL, &secret(OFFLINE_DIGEST))
        .await
        .unwrap();

    assert!(matches!(outcome, LoginOutcome::Offline(_)));
    assert_eq!(outcome.session().mode(), SessionMode::Offline);
    assert_eq!(login_notice(&outcome), Some("Signed in offline"));
    assert_eq!(
        fx.replica.offline_marker().await.unwrap(),
        Some(ProfileId::new(CASHIER_ID))
    );
}

#[tokio::test]
async fn test_offline_login_rejects_wrong_secret() {
    let fx = replicated(false).await;

    let err = fx
        .terminal
        .controller
        .login(CASHIER_EMAIL, &secret(REMOTE_PASSWORD))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials));
    assert_eq!(
        TerminalError::from(err).user_message(),
        "Wrong e-mail or password"
    );
    assert_eq!(fx.terminal.controller.current(), Session::Anonymous);
}

#[tokio::test]
async fn test_never_replicated_cashier_cannot_log_in_offline() {
    let fx = Fixture::new(false).await;

    let err = fx
        .terminal
        .controller
        .login(CASHIER_EMAIL, &secret(OFFLINE_DIGEST))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn test_connectivity_lost_mid_login_switches_to_offline() {
    let fx = replicated(true).await;

    // The monitor still believes it is online; only the next probe finds out.
    fx.probe.set(false);
    fx.provider.set_reachable(false);

    let outcome = fx
        .terminal
        .controller
        .login(CASHIER_EMAIL, &secret(OFFLINE_DIGEST))
        .await
        .unwrap();

    assert!(matches!(outcome, LoginOutcome::SwitchedOffline(_)));
    assert_eq!(
        login_notice(&outcome),
        Some("Connection lost, signed in offline")
    );
    assert!(!fx.terminal.monitor.current_status().is_online());
}

#[tokio::test]
async fn test_connectivity_lost_is_told_apart_from_wrong_password() {
    // Never replicated: the offline fallback cannot verify anyone.
    let fx = Fixture::new(true).await;
    fx.probe.set(false);
    fx.provider.set_reachable(false);

    let switched = fx
        .terminal
        .controller
        .login(CASHIER_EMAIL, &secret(REMOTE_PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(switched, AuthError::OfflineRejected));

    fx.set_online(true).await;
    let wrong = fx
        .terminal
        .controller
        .login(CASHIER_EMAIL, &secret("not-the-password"))
        .await
        .unwrap_err();
    assert!(matches!(wrong, AuthError::InvalidCredentials));

    assert_ne!(
        TerminalError::from(switched).user_message(),
        TerminalError::from(wrong).user_message()
    );
}

// =============================================================================
// Offline Selling
// =============================================================================

#[tokio::test]
async fn test_offline_session_counts_orders_once_the_store_answers() {
    let fx = replicated(false).await;
    fx.terminal
        .controller
        .login(CASHIER_EMAIL, &secret(OFFLINE_DIGEST))
        .await
        .unwrap();

    // The remote store is still reachable through its own connection even
    // though the public probe endpoints fail.
    let checkout = fx
        .terminal
        .checkout
        .checkout(&cash_sale("p1", 10, 1))
        .await
        .unwrap();

    assert_eq!(checkout.usage.unwrap().usage.count, 1);
    assert_eq!(fx.store.stock_of(&ProductId::new("p1")).await, Some(4));
}

// =============================================================================
// Restoration at Boot
// =============================================================================

#[tokio::test]
async fn test_restart_restores_offline_session() {
    let fx = replicated(false).await;
    fx.terminal
        .controller
        .login(CASHIER_EMAIL, &secret(OFFLINE_DIGEST))
        .await
        .unwrap();

    // Same replica, new process.
    let restarted = Fixture::with_replica(fx.store.clone(), fx.replica.clone(), true).await;
    let session = restarted.terminal.boot().await.unwrap();

    assert_eq!(session.mode(), SessionMode::Offline);
    assert_eq!(session.principal().unwrap().id, ProfileId::new(CASHIER_ID));
    assert!(!restarted.terminal.controller.is_listening());
    assert_eq!(
        restarted.terminal.guard.principal().unwrap().id,
        ProfileId::new(CASHIER_ID)
    );

    // A remote identity showing up later must not replace the offline session.
    restarted.provider.push_identity(Some(Identity {
        uid: ProfileId::new(CASHIER_ID),
        identifier: LoginIdentifier::parse(CASHIER_EMAIL).unwrap(),
    }));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        restarted.terminal.controller.current().mode(),
        SessionMode::Offline
    );
}

#[tokio::test]
async fn test_logout_clears_the_marker_for_the_next_boot() {
    let fx = replicated(false).await;
    fx.terminal
        .controller
        .login(CASHIER_EMAIL, &secret(OFFLINE_DIGEST))
        .await
        .unwrap();
    fx.terminal.controller.logout().await;
    assert!(fx.replica.offline_marker().await.unwrap().is_none());

    let restarted = Fixture::with_replica(fx.store.clone(), fx.replica.clone(), false).await;
    let session = restarted.terminal.boot().await.unwrap();
    assert_eq!(session, Session::Anonymous);
}

#[tokio::test]
async fn test_online_boot_without_marker_attaches_listener() {
    let fx = Fixture::new(true).await;

    let session = fx.terminal.boot().await.unwrap();

    assert_eq!(session, Session::Anonymous);
    assert!(fx.terminal.controller.is_listening());
}
