//! Integration tests for plan allowance across checkouts and months.

#![allow(clippy::unwrap_used)]

use balcao_core::{ProfileId, SubscriptionStatus};
use balcao_integration_tests::{
    CASHIER_EMAIL, CASHIER_ID, Fixture, REMOTE_PASSWORD, cash_sale, cashier, june_1, secret,
};
use balcao_terminal::usage::{Feature, QuotaNotice, UsageError};
use balcao_terminal::{CheckoutError, TerminalError};

/// Logged-in terminal whose cashier is on `plan` with `used` May orders.
async fn terminal_with_usage(plan: &str, used: u32) -> Fixture {
    let fx = Fixture::new(true).await;
    fx.store
        .insert_profile(cashier(plan, Some(("2025-05", used))))
        .await;
    fx.terminal
        .controller
        .login(CASHIER_EMAIL, &secret(REMOTE_PASSWORD))
        .await
        .unwrap();
    fx
}

#[tokio::test]
async fn test_last_order_of_may_then_june_restarts() {
    let fx = terminal_with_usage("basic", 199).await;

    // 199 of 200: allowed, flagged, and the order that fills the plan.
    let last = fx
        .terminal
        .checkout
        .checkout(&cash_sale("p1", 10, 1))
        .await
        .unwrap();
    assert!(matches!(last.notice, QuotaNotice::NearLimit { used: 199, .. }));
    let update = last.usage.unwrap();
    assert_eq!(update.usage.count, 200);
    assert_eq!(update.status, SubscriptionStatus::Overdue);

    // 200 of 200: blocked before anything is committed.
    let err = fx
        .terminal
        .checkout
        .checkout(&cash_sale("p1", 10, 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::Usage(UsageError::PlanLimitExceeded {
            used: 200,
            limit: 200
        })
    ));
    assert_eq!(fx.store.sales().await.len(), 1);
    assert_eq!(
        TerminalError::from(err).user_message(),
        "Your plan's monthly order limit has been reached"
    );

    // June: May's counter no longer applies.
    fx.clock.set(june_1());
    let june = fx
        .terminal
        .checkout
        .checkout(&cash_sale("p1", 10, 1))
        .await
        .unwrap();
    assert_eq!(june.notice, QuotaNotice::Clear);
    let update = june.usage.unwrap();
    assert_eq!(update.usage.month.to_string(), "2025-06");
    assert_eq!(update.usage.count, 1);
    assert_eq!(update.status, SubscriptionStatus::Active);

    let remote = fx.store.profile(&ProfileId::new(CASHIER_ID)).await.unwrap();
    let subscription = remote.subscription.unwrap();
    assert_eq!(subscription.status.as_deref(), Some("active"));
    assert_eq!(subscription.monthly_orders.unwrap().count, Some(1));
}

#[tokio::test]
async fn test_session_principal_tracks_the_counter() {
    let fx = terminal_with_usage("pro", 10).await;

    fx.terminal
        .checkout
        .checkout(&cash_sale("p1", 10, 1))
        .await
        .unwrap();

    let principal = fx.terminal.controller.current().principal().cloned().unwrap();
    assert_eq!(fx.terminal.meter.orders_this_month(&principal), 11);
    assert_eq!(
        fx.terminal.guard.principal().unwrap().monthly_usage,
        principal.monthly_usage
    );
}

#[tokio::test]
async fn test_features_follow_the_logged_in_plan() {
    let fx = terminal_with_usage("free", 0).await;
    let meter = &fx.terminal.meter;

    assert!(fx.terminal.guard.has_feature(meter, Feature::Pdv));
    assert!(!fx.terminal.guard.has_feature(meter, Feature::Delivery));

    fx.terminal.controller.logout().await;
    assert!(!fx.terminal.guard.has_feature(meter, Feature::Pdv));
}
