//! Shared test doubles for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use meridian::core::config::{RiskLimits, StreamConfig};
use meridian::core::types::{
    Order, OrderStatus, OrderType, Position, PositionSide, Side, Symbol,
};
use meridian::core::{Error, Result};
use meridian::engine::{OrderCoordinator, PositionCache};
use meridian::exchange::{ExchangeGateway, OrderRequest};
use meridian::notify::{AlertLevel, Notifier};
use meridian::stream::SubscriptionRegistry;

/// In-memory exchange double. Market orders net against the held position
/// the way the real venue would: an opposite-side order of the full size
/// brings exposure to zero and the position disappears.
pub struct MockExchange {
    state: Mutex<MockState>,
    next_order_id: AtomicU64,
    pub fail_orders: AtomicBool,
    /// Reject only reduce-only (protective) submissions.
    pub fail_protective: AtomicBool,
}

struct MockState {
    mark_prices: HashMap<Symbol, Decimal>,
    /// Signed quantity per symbol: positive long, negative short.
    exposure: HashMap<Symbol, Decimal>,
    leverage: HashMap<Symbol, u32>,
    submitted: Vec<OrderRequest>,
    canceled: Vec<Symbol>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                mark_prices: HashMap::new(),
                exposure: HashMap::new(),
                leverage: HashMap::new(),
                submitted: Vec::new(),
                canceled: Vec::new(),
            }),
            next_order_id: AtomicU64::new(1),
            fail_orders: AtomicBool::new(false),
            fail_protective: AtomicBool::new(false),
        }
    }

    pub fn with_mark_price(self, symbol: &str, price: i64) -> Self {
        self.state
            .lock()
            .mark_prices
            .insert(Symbol::new(symbol), Decimal::from(price));
        self
    }

    pub fn submitted_orders(&self) -> Vec<OrderRequest> {
        self.state.lock().submitted.clone()
    }

    pub fn canceled_symbols(&self) -> Vec<Symbol> {
        self.state.lock().canceled.clone()
    }

    pub fn leverage_for(&self, symbol: &Symbol) -> Option<u32> {
        self.state.lock().leverage.get(symbol).copied()
    }

    fn position_from_exposure(state: &MockState, symbol: &Symbol) -> Option<Position> {
        let signed = state.exposure.get(symbol).copied()?;
        if signed.is_zero() {
            return None;
        }
        Some(Position {
            symbol: symbol.clone(),
            side: if signed > Decimal::ZERO {
                PositionSide::Long
            } else {
                PositionSide::Short
            },
            quantity: signed.abs(),
            entry_price: state
                .mark_prices
                .get(symbol)
                .copied()
                .unwrap_or(Decimal::ZERO),
            leverage: state.leverage.get(symbol).copied().unwrap_or(1),
            margin: Decimal::ZERO,
            liquidation_price: None,
            unrealized_pnl: Decimal::ZERO,
        })
    }
}

#[async_trait]
impl ExchangeGateway for MockExchange {
    async fn get_mark_price(&self, symbol: &Symbol) -> Result<Decimal> {
        self.state
            .lock()
            .mark_prices
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::Exchange(format!("no mark price for {}", symbol)))
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<()> {
        self.state.lock().leverage.insert(symbol.clone(), leverage);
        Ok(())
    }

    async fn submit_order(&self, request: OrderRequest) -> Result<Order> {
        if self.fail_orders.load(Ordering::Relaxed) {
            return Err(Error::Exchange("order rejected".to_string()));
        }
        if request.reduce_only && self.fail_protective.load(Ordering::Relaxed) {
            return Err(Error::Exchange("protective order rejected".to_string()));
        }

        let mut state = self.state.lock();
        state.submitted.push(request.clone());

        let price = state
            .mark_prices
            .get(&request.symbol)
            .copied()
            .unwrap_or(Decimal::ZERO);

        // Only market orders move exposure; protective orders rest on the
        // book until triggered.
        let status = if request.order_type == OrderType::Market {
            let delta = match request.side {
                Side::Buy => request.quantity,
                Side::Sell => -request.quantity,
            };
            let entry = state
                .exposure
                .entry(request.symbol.clone())
                .or_insert(Decimal::ZERO);
            *entry += delta;
            if entry.is_zero() {
                state.exposure.remove(&request.symbol);
            }
            OrderStatus::Filled
        } else {
            OrderStatus::New
        };

        Ok(Order {
            id: self
                .next_order_id
                .fetch_add(1, Ordering::Relaxed)
                .to_string(),
            symbol: request.symbol,
            side: request.side,
            quantity: request.quantity,
            price,
            leverage: request.leverage,
            status,
            stop_loss: None,
            take_profit: None,
            created_at: Utc::now(),
        })
    }

    async fn get_position(&self, symbol: &Symbol) -> Result<Option<Position>> {
        let state = self.state.lock();
        Ok(Self::position_from_exposure(&state, symbol))
    }

    async fn get_all_positions(&self) -> Result<Vec<Position>> {
        let state = self.state.lock();
        let symbols: Vec<Symbol> = state.exposure.keys().cloned().collect();
        Ok(symbols
            .iter()
            .filter_map(|s| Self::position_from_exposure(&state, s))
            .collect())
    }

    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<()> {
        self.state.lock().canceled.push(symbol.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Notifier double recording every alert.
pub struct RecordingNotifier {
    alerts: Mutex<Vec<(AlertLevel, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
        }
    }

    pub fn alerts(&self) -> Vec<(AlertLevel, String)> {
        self.alerts.lock().clone()
    }

    pub fn has_level(&self, level: AlertLevel) -> bool {
        self.alerts.lock().iter().any(|(l, _)| *l == level)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, level: AlertLevel, message: &str) {
        self.alerts.lock().push((level, message.to_string()));
    }
}

/// Wire a coordinator over the given doubles with the given limits.
pub fn build_coordinator(
    gateway: Arc<MockExchange>,
    notifier: Arc<RecordingNotifier>,
    limits: RiskLimits,
) -> Arc<OrderCoordinator> {
    let stream = StreamConfig::default();
    let registry = Arc::new(SubscriptionRegistry::new(gateway.clone(), &stream));
    let cache = Arc::new(PositionCache::new(
        gateway.clone(),
        notifier.clone(),
        registry,
        &stream,
    ));
    Arc::new(OrderCoordinator::new(gateway, cache, notifier, limits))
}

pub fn default_limits() -> RiskLimits {
    RiskLimits {
        max_leverage: 125,
        max_quantity: Decimal::ONE,
        max_positions: 5,
        allowed_symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
    }
}
