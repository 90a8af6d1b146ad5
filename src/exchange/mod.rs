//! Exchange gateway - the boundary to the remote exchange
//!
//! The core never talks to the wire directly; everything goes through
//! [`ExchangeGateway`], which the Binance implementation and the test
//! doubles both satisfy.

pub mod binance;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core::types::{Order, OrderType, Position, Side, Symbol};
use crate::core::Result;

pub use binance::BinanceGateway;

/// Outbound exchange operations consumed by the core.
///
/// Transport failures surface as [`crate::core::Error::Exchange`] or
/// [`crate::core::Error::Network`]; the core does not distinguish
/// transient from permanent upstream failures.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Current mark price for the symbol.
    async fn get_mark_price(&self, symbol: &Symbol) -> Result<Decimal>;

    /// Set leverage for the symbol. Exchange-side no-op when unchanged.
    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<()>;

    /// Submit an order and return the resulting order record.
    async fn submit_order(&self, request: OrderRequest) -> Result<Order>;

    /// Position for one symbol; `None` when the exchange reports zero
    /// exposure.
    async fn get_position(&self, symbol: &Symbol) -> Result<Option<Position>>;

    /// All positions with nonzero exposure.
    async fn get_all_positions(&self) -> Result<Vec<Position>>;

    /// Cancel every outstanding order for the symbol.
    async fn cancel_all_orders(&self, symbol: &Symbol) -> Result<()>;

    /// Exchange name for logging.
    fn name(&self) -> &str;
}

/// Order submission parameters.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Trigger price for stop / take-profit orders.
    pub stop_price: Option<Decimal>,
    /// Reduce-only orders can shrink a position but never open one.
    pub reduce_only: bool,
    /// Leverage carried onto the resulting order record.
    pub leverage: u32,
}

impl OrderRequest {
    pub fn market(symbol: Symbol, side: Side, quantity: Decimal, leverage: u32) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Market,
            quantity,
            stop_price: None,
            reduce_only: false,
            leverage,
        }
    }

    /// Reduce-only protective order triggered at `stop_price`.
    pub fn protective(
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        quantity: Decimal,
        stop_price: Decimal,
        leverage: u32,
    ) -> Self {
        Self {
            symbol,
            side,
            order_type,
            quantity,
            stop_price: Some(stop_price),
            reduce_only: true,
            leverage,
        }
    }
}
