//! Integration tests for a single terminal's checkout path.
//!
//! Online login, catalog lookup, checkout, and the effects on stock, sales
//! and the cashier's usage counter.

#![allow(clippy::unwrap_used)]

use balcao_core::{
    BusinessId, CartLine, Money, Payment, PaymentMethod, ProductId, ProfileId, SaleStatus,
    SessionMode, SubscriptionStatus,
};
use balcao_integration_tests::{
    BUSINESS, CASHIER_EMAIL, CASHIER_ID, Fixture, REMOTE_PASSWORD, cash_sale, product, secret,
};
use balcao_terminal::sale::CommitError;
use balcao_terminal::{CatalogOrigin, CheckoutError, CommitRequest, LoginOutcome, TerminalError};

// =============================================================================
// Happy Path
// =============================================================================

#[tokio::test]
async fn test_online_login_then_sell_the_whole_stock() {
    let fx = Fixture::new(true).await;

    let outcome = fx
        .terminal
        .controller
        .login(CASHIER_EMAIL, &secret(REMOTE_PASSWORD))
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::Online(_)));
    assert_eq!(outcome.session().mode(), SessionMode::Authenticated);

    let checkout = fx
        .terminal
        .checkout
        .checkout(&cash_sale("p1", 10, 5))
        .await
        .unwrap();

    assert_eq!(checkout.sale.final_amount, Money::from_units(50));
    assert_eq!(checkout.sale.change(), Money::ZERO);
    assert_eq!(checkout.sale.status, SaleStatus::Completed);
    assert_eq!(fx.store.stock_of(&ProductId::new("p1")).await, Some(0));
    assert_eq!(fx.store.sales().await.len(), 1);

    let usage = checkout.usage.unwrap();
    assert_eq!(usage.usage.count, 1);
    assert_eq!(usage.status, SubscriptionStatus::Active);

    let remote = fx.store.profile(&ProfileId::new(CASHIER_ID)).await.unwrap();
    let orders = remote.subscription.unwrap().monthly_orders.unwrap();
    assert_eq!(orders.month.as_deref(), Some("2025-05"));
    assert_eq!(orders.count, Some(1));
}

#[tokio::test]
async fn test_change_goes_to_the_cash_payment() {
    let fx = Fixture::new(true).await;
    fx.terminal
        .controller
        .login(CASHIER_EMAIL, &secret(REMOTE_PASSWORD))
        .await
        .unwrap();

    let request = CommitRequest::new(
        BUSINESS,
        vec![CartLine::new("p1", Money::from_units(10), 3)],
        vec![
            Payment::new(PaymentMethod::Pix, Money::from_units(20)),
            Payment::new(PaymentMethod::Cash, Money::from_units(20)),
        ],
    )
    .with_discount(Money::from_units(5));

    let sale = fx.terminal.checkout.checkout(&request).await.unwrap().sale;

    assert_eq!(sale.subtotal, Money::from_units(30));
    assert_eq!(sale.final_amount, Money::from_units(25));
    assert_eq!(sale.change(), Money::from_units(15));
    assert_eq!(sale.payments[0].change, Money::ZERO);
    assert_eq!(sale.payments[1].change, Money::from_units(15));
}

// =============================================================================
// Rejections
// =============================================================================

#[tokio::test]
async fn test_overselling_changes_nothing() {
    let fx = Fixture::new(true).await;
    fx.store.insert_product(product("p2", "Pastel", 8, 1)).await;
    fx.terminal
        .controller
        .login(CASHIER_EMAIL, &secret(REMOTE_PASSWORD))
        .await
        .unwrap();
    let before = fx.store.stock_snapshot().await;

    let request = CommitRequest::new(
        BUSINESS,
        vec![
            CartLine::new("p1", Money::from_units(10), 2),
            CartLine::new("p2", Money::from_units(8), 1),
            CartLine::new("p2", Money::from_units(8), 1),
        ],
        vec![Payment::new(PaymentMethod::Debit, Money::from_units(36))],
    );
    let err = fx.terminal.checkout.checkout(&request).await.unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::Commit(CommitError::StockInsufficient {
            available: 1,
            requested: 2,
            ..
        })
    ));
    assert_eq!(fx.store.stock_snapshot().await, before);
    assert!(fx.store.sales().await.is_empty());

    let message = TerminalError::from(err).user_message();
    assert_eq!(message, "Not enough stock for p2: 1 left");
}

#[tokio::test]
async fn test_negative_stock_when_the_business_allows_it() {
    let fx = Fixture::new(true).await;
    fx.terminal
        .controller
        .login(CASHIER_EMAIL, &secret(REMOTE_PASSWORD))
        .await
        .unwrap();

    let request = cash_sale("p1", 10, 7).allowing_negative_stock();
    fx.terminal.checkout.checkout(&request).await.unwrap();

    assert_eq!(fx.store.stock_of(&ProductId::new("p1")).await, Some(-2));
}

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn test_catalog_survives_losing_the_network() {
    let fx = Fixture::new(true).await;
    fx.store.insert_product(product("p2", "Açaí", 15, 9)).await;

    let online = fx
        .terminal
        .catalog
        .products(&BusinessId::new(BUSINESS))
        .await
        .unwrap();
    assert_eq!(online.origin, CatalogOrigin::Remote);
    assert_eq!(online.items.len(), 2);

    fx.set_online(false).await;
    let offline = fx
        .terminal
        .catalog
        .products(&BusinessId::new(BUSINESS))
        .await
        .unwrap();
    assert_eq!(offline.origin, CatalogOrigin::Replica);
    assert_eq!(offline.items, online.items);
}
