//! End-to-end trading flow against the in-memory exchange double.

mod common;

use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::{MockExchange, RecordingNotifier, build_coordinator, default_limits};
use meridian::core::config::RiskLimits;
use meridian::core::types::{
    OrderIntent, OrderStatus, OrderType, PositionSide, Side, Symbol,
};
use meridian::core::{Error, RiskViolation};
use meridian::engine::CloseOutcome;
use meridian::exchange::ExchangeGateway;
use meridian::notify::AlertLevel;

fn qty(s: &str) -> Decimal {
    s.parse().unwrap()
}

#[tokio::test]
async fn complete_long_flow_with_protection() {
    let gateway = Arc::new(MockExchange::new().with_mark_price("BTCUSDT", 50000));
    let notifier = Arc::new(RecordingNotifier::new());
    let coordinator = build_coordinator(gateway.clone(), notifier.clone(), default_limits());
    let btc = Symbol::new("BTCUSDT");

    // 1. Open a long with 2% stop-loss and take-profit.
    let intent = OrderIntent::market(btc.clone(), Side::Buy, qty("0.001"), 10)
        .with_protection(Some(Decimal::from(2)), Some(Decimal::from(2)));
    let order = coordinator.place(intent).await.unwrap();

    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.side, Side::Buy);
    assert_eq!(gateway.leverage_for(&btc), Some(10));

    // The fill shows up in the cache as a long position.
    let position = coordinator.cache().get(&btc).unwrap();
    assert_eq!(position.side, PositionSide::Long);
    assert_eq!(position.quantity, qty("0.001"));

    // Two reduce-only protective orders on the opposite side, triggered
    // off the mark price: 50000 * 0.98 and 50000 * 1.02.
    let protective: Vec<_> = gateway
        .submitted_orders()
        .into_iter()
        .filter(|o| o.reduce_only)
        .collect();
    assert_eq!(protective.len(), 2);
    for order in &protective {
        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.quantity, qty("0.001"));
    }
    let stop = protective
        .iter()
        .find(|o| o.order_type == OrderType::StopMarket)
        .unwrap();
    assert_eq!(stop.stop_price, Some(Decimal::from(49000)));
    let take = protective
        .iter()
        .find(|o| o.order_type == OrderType::TakeProfitMarket)
        .unwrap();
    assert_eq!(take.stop_price, Some(Decimal::from(51000)));

    assert!(notifier.has_level(AlertLevel::Trade));

    // 2. Close: full-quantity opposite-side market order, outstanding
    // orders cancelled, cache entry gone.
    let outcome = coordinator.close_position(&btc).await.unwrap();
    let close_order = outcome.order().expect("close should return an order");
    assert_eq!(close_order.side, Side::Sell);
    assert_eq!(close_order.quantity, qty("0.001"));
    assert!(gateway.canceled_symbols().contains(&btc));
    assert!(coordinator.cache().get(&btc).is_none());
}

#[tokio::test]
async fn short_flow_closes_with_buy() {
    let gateway = Arc::new(MockExchange::new().with_mark_price("ETHUSDT", 3000));
    let notifier = Arc::new(RecordingNotifier::new());
    let coordinator = build_coordinator(gateway.clone(), notifier, default_limits());
    let eth = Symbol::new("ETHUSDT");

    let intent = OrderIntent::market(eth.clone(), Side::Sell, qty("0.01"), 5);
    let order = coordinator.place(intent).await.unwrap();
    assert_eq!(order.status, OrderStatus::Filled);

    let position = coordinator.cache().get(&eth).unwrap();
    assert_eq!(position.side, PositionSide::Short);

    let outcome = coordinator.close_position(&eth).await.unwrap();
    assert_eq!(outcome.order().unwrap().side, Side::Buy);
    assert!(coordinator.cache().get(&eth).is_none());
}

#[tokio::test]
async fn close_without_position_is_idempotent() {
    let gateway = Arc::new(MockExchange::new().with_mark_price("BTCUSDT", 50000));
    let notifier = Arc::new(RecordingNotifier::new());
    let coordinator = build_coordinator(gateway.clone(), notifier, default_limits());
    let btc = Symbol::new("BTCUSDT");

    // No cached position: defined empty outcome, no gateway submission.
    let outcome = coordinator.close_position(&btc).await.unwrap();
    assert!(matches!(outcome, CloseOutcome::NoActivePosition));
    assert!(gateway.submitted_orders().is_empty());

    // Retry is equally safe.
    let outcome = coordinator.close_position(&btc).await.unwrap();
    assert!(matches!(outcome, CloseOutcome::NoActivePosition));
    assert!(gateway.submitted_orders().is_empty());
}

#[tokio::test]
async fn risk_violation_makes_no_exchange_call() {
    let gateway = Arc::new(MockExchange::new().with_mark_price("BTCUSDT", 50000));
    let notifier = Arc::new(RecordingNotifier::new());
    let limits = RiskLimits {
        allowed_symbols: vec!["BTCUSDT".to_string()],
        ..default_limits()
    };
    let coordinator = build_coordinator(gateway.clone(), notifier.clone(), limits);

    let intent = OrderIntent::market(Symbol::new("DOGEUSDT"), Side::Buy, qty("1"), 10);
    let err = coordinator.place(intent).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Risk(RiskViolation::InvalidSymbol(_))
    ));
    // Rejected before the gateway: nothing submitted, no leverage call,
    // and no notification side effects.
    assert!(gateway.submitted_orders().is_empty());
    assert!(gateway.leverage_for(&Symbol::new("DOGEUSDT")).is_none());
    assert!(notifier.alerts().is_empty());
}

#[tokio::test]
async fn position_limit_blocks_new_symbol_only() {
    let gateway = Arc::new(
        MockExchange::new()
            .with_mark_price("BTCUSDT", 50000)
            .with_mark_price("ETHUSDT", 3000),
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let limits = RiskLimits {
        max_positions: 1,
        ..default_limits()
    };
    let coordinator = build_coordinator(gateway.clone(), notifier, limits);

    coordinator
        .place(OrderIntent::market(
            Symbol::new("BTCUSDT"),
            Side::Buy,
            qty("0.001"),
            10,
        ))
        .await
        .unwrap();

    // A second symbol is rejected at the limit.
    let err = coordinator
        .place(OrderIntent::market(
            Symbol::new("ETHUSDT"),
            Side::Buy,
            qty("0.01"),
            10,
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Risk(RiskViolation::PositionLimitExceeded(1))
    ));

    // Adding to the open symbol still goes through.
    coordinator
        .place(OrderIntent::market(
            Symbol::new("BTCUSDT"),
            Side::Buy,
            qty("0.001"),
            10,
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn exchange_failure_surfaces_and_alerts() {
    let gateway = Arc::new(MockExchange::new().with_mark_price("BTCUSDT", 50000));
    let notifier = Arc::new(RecordingNotifier::new());
    let coordinator = build_coordinator(gateway.clone(), notifier.clone(), default_limits());

    gateway.fail_orders.store(true, Ordering::Relaxed);
    let err = coordinator
        .place(OrderIntent::market(
            Symbol::new("BTCUSDT"),
            Side::Buy,
            qty("0.001"),
            10,
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Exchange(_)));
    assert!(notifier.has_level(AlertLevel::Error));
    assert!(coordinator.cache().is_empty());
}

#[tokio::test]
async fn protective_failure_leaves_primary_standing() {
    let gateway = Arc::new(MockExchange::new().with_mark_price("ETHUSDT", 3000));
    let notifier = Arc::new(RecordingNotifier::new());
    let coordinator = build_coordinator(gateway.clone(), notifier.clone(), default_limits());
    let eth = Symbol::new("ETHUSDT");

    // Primary fills, protective submission is rejected: the placement
    // still succeeds and the position stands unprotected, with a warning.
    gateway.fail_protective.store(true, Ordering::Relaxed);
    let intent = OrderIntent::market(eth.clone(), Side::Sell, qty("0.01"), 5)
        .with_protection(Some(Decimal::from(2)), Some(Decimal::from(2)));
    let order = coordinator.place(intent).await.unwrap();

    assert_eq!(order.status, OrderStatus::Filled);
    assert!(coordinator.cache().get(&eth).is_some());
    assert!(notifier.has_level(AlertLevel::Warning));
    // Nothing protective made it onto the book.
    assert!(gateway.submitted_orders().iter().all(|o| !o.reduce_only));
}

#[tokio::test]
async fn external_event_refreshes_single_symbol() {
    let gateway = Arc::new(
        MockExchange::new()
            .with_mark_price("BTCUSDT", 50000)
            .with_mark_price("ETHUSDT", 3000),
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let coordinator = build_coordinator(gateway.clone(), notifier, default_limits());
    let btc = Symbol::new("BTCUSDT");

    coordinator
        .place(OrderIntent::market(btc.clone(), Side::Buy, qty("0.001"), 10))
        .await
        .unwrap();

    // The position vanishes exchange-side (manual close); the webhook
    // event makes the cache catch up.
    gateway
        .submit_order(meridian::exchange::OrderRequest::market(
            btc.clone(),
            Side::Sell,
            qty("0.001"),
            10,
        ))
        .await
        .unwrap();

    let refreshed = coordinator.on_external_position_event(&btc).await.unwrap();
    assert!(refreshed.is_none());
    assert!(coordinator.cache().get(&btc).is_none());
}
