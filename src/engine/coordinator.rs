//! Order execution coordinator
//!
//! Drives an intent through validate -> set leverage -> market order ->
//! optional protective orders -> cache refresh -> notification. No
//! automatic retry of submissions: duplicate-order risk outweighs the
//! benefit. `close_position` is idempotent and may be retried freely.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::config::RiskLimits;
use crate::core::error::Result;
use crate::core::types::{Order, OrderIntent, OrderType, Position, Side, Symbol};
use crate::engine::positions::PositionCache;
use crate::engine::risk;
use crate::exchange::{ExchangeGateway, OrderRequest};
use crate::notify::{AlertLevel, Notifier};

/// Outcome of a close request. Closing a symbol with no cached position is
/// a defined empty result, not a failure.
#[derive(Debug, Clone)]
pub enum CloseOutcome {
    Closed(Order),
    NoActivePosition,
}

impl CloseOutcome {
    pub fn order(&self) -> Option<&Order> {
        match self {
            CloseOutcome::Closed(order) => Some(order),
            CloseOutcome::NoActivePosition => None,
        }
    }
}

/// Coordinates the order lifecycle against the exchange gateway.
pub struct OrderCoordinator {
    gateway: Arc<dyn ExchangeGateway>,
    cache: Arc<PositionCache>,
    notifier: Arc<dyn Notifier>,
    /// Snapshot-read during placement; replaced wholesale by the external
    /// settings collaborator.
    limits: RwLock<RiskLimits>,
}

impl OrderCoordinator {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        cache: Arc<PositionCache>,
        notifier: Arc<dyn Notifier>,
        limits: RiskLimits,
    ) -> Self {
        Self {
            gateway,
            cache,
            notifier,
            limits: RwLock::new(limits),
        }
    }

    /// Replace the risk limits snapshot (settings-update path).
    pub fn update_limits(&self, limits: RiskLimits) {
        *self.limits.write() = limits;
    }

    /// Place a market order for the intent.
    ///
    /// A risk violation rejects the intent before any exchange call and
    /// without notification side effects. Exchange failures surface to the
    /// caller and additionally emit a best-effort error alert.
    pub async fn place(&self, intent: OrderIntent) -> Result<Order> {
        let limits = self.limits.read().clone();
        risk::validate(&intent, &limits, &self.cache.snapshot())?;

        match self.execute(&intent).await {
            Ok(order) => Ok(order),
            Err(e) => {
                error!("Order placement failed for {}: {}", intent.symbol, e);
                self.notifier
                    .notify(
                        AlertLevel::Error,
                        &format!("Order failed: {} {} - {}", intent.side, intent.symbol, e),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn execute(&self, intent: &OrderIntent) -> Result<Order> {
        // Idempotent on the exchange side when the leverage is unchanged.
        self.gateway
            .set_leverage(&intent.symbol, intent.leverage)
            .await?;

        let request = OrderRequest::market(
            intent.symbol.clone(),
            intent.side,
            intent.quantity,
            intent.leverage,
        );
        let mut order = self.gateway.submit_order(request).await?;
        order.stop_loss = intent.stop_loss;
        order.take_profit = intent.take_profit;

        info!(
            "Order submitted: {} {} {} @ {} ({:?})",
            order.side, order.quantity, order.symbol, order.price, order.status
        );

        if intent.stop_loss.is_some() || intent.take_profit.is_some() {
            self.attach_protection(intent).await;
        }

        // Read-after-write: the exchange is the authority on the resulting
        // exposure; deriving locally would miss partial fills, fees and
        // concurrent activity on the same symbol.
        self.cache.refresh(&intent.symbol).await?;

        self.notifier
            .notify(
                AlertLevel::Trade,
                &format!(
                    "Trade executed: {} {} {} @ {}",
                    order.side, order.quantity, order.symbol, order.price
                ),
            )
            .await;

        Ok(order)
    }

    /// Submit reduce-only stop-loss / take-profit orders.
    ///
    /// Trigger prices derive from the mark price fetched here, after the
    /// primary fill, not from the fill price itself. A failure leaves the
    /// position standing unprotected: reported, never rolled back.
    async fn attach_protection(&self, intent: &OrderIntent) {
        let mark_price = match self.gateway.get_mark_price(&intent.symbol).await {
            Ok(price) => price,
            Err(e) => {
                warn!(
                    "Mark price unavailable, {} left unprotected: {}",
                    intent.symbol, e
                );
                self.notifier
                    .notify(
                        AlertLevel::Warning,
                        &format!("Protective orders skipped for {}: {}", intent.symbol, e),
                    )
                    .await;
                return;
            }
        };

        let hundred = Decimal::from(100);
        let close_side = intent.side.opposite();

        if let Some(stop_loss) = intent.stop_loss {
            let stop_price = match intent.side {
                Side::Buy => mark_price * (Decimal::ONE - stop_loss / hundred),
                Side::Sell => mark_price * (Decimal::ONE + stop_loss / hundred),
            };
            self.submit_protective(intent, close_side, OrderType::StopMarket, stop_price)
                .await;
        }

        if let Some(take_profit) = intent.take_profit {
            let stop_price = match intent.side {
                Side::Buy => mark_price * (Decimal::ONE + take_profit / hundred),
                Side::Sell => mark_price * (Decimal::ONE - take_profit / hundred),
            };
            self.submit_protective(intent, close_side, OrderType::TakeProfitMarket, stop_price)
                .await;
        }
    }

    async fn submit_protective(
        &self,
        intent: &OrderIntent,
        side: Side,
        order_type: OrderType,
        stop_price: Decimal,
    ) {
        let request = OrderRequest::protective(
            intent.symbol.clone(),
            side,
            order_type,
            intent.quantity,
            stop_price,
            intent.leverage,
        );

        match self.gateway.submit_order(request).await {
            Ok(_) => {
                info!(
                    "Protective order placed: {} {} {} trigger {}",
                    order_type, side, intent.symbol, stop_price
                );
            }
            Err(e) => {
                warn!(
                    "Protective order failed for {} ({}): {}",
                    intent.symbol, order_type, e
                );
                self.notifier
                    .notify(
                        AlertLevel::Warning,
                        &format!(
                            "Protective order failed, {} unprotected: {}",
                            intent.symbol, e
                        ),
                    )
                    .await;
            }
        }
    }

    /// Close the full cached position for a symbol.
    ///
    /// With no cache entry this returns [`CloseOutcome::NoActivePosition`]
    /// without touching the exchange, which makes retries safe once the
    /// entry is gone.
    pub async fn close_position(&self, symbol: &Symbol) -> Result<CloseOutcome> {
        let Some(position) = self.cache.get(symbol) else {
            info!("Close requested with no active position: {}", symbol);
            return Ok(CloseOutcome::NoActivePosition);
        };

        let order = match self.submit_close(symbol, &position).await {
            Ok(order) => order,
            Err(e) => {
                error!("Position close failed for {}: {}", symbol, e);
                self.notifier
                    .notify(
                        AlertLevel::Error,
                        &format!("Close failed: {} - {}", symbol, e),
                    )
                    .await;
                return Err(e);
            }
        };

        // Protective orders are orphaned after the close; a cancellation
        // failure is logged, not retried - nothing of value is blocked on
        // a now-irrelevant resource.
        if let Err(e) = self.gateway.cancel_all_orders(symbol).await {
            warn!("Failed to cancel outstanding orders for {}: {}", symbol, e);
        }

        self.cache.remove(symbol);

        self.notifier
            .notify(
                AlertLevel::Trade,
                &format!(
                    "Position closed: {} {} @ {} (est. PnL {})",
                    symbol, position.quantity, order.price, position.unrealized_pnl
                ),
            )
            .await;

        Ok(CloseOutcome::Closed(order))
    }

    async fn submit_close(&self, symbol: &Symbol, position: &Position) -> Result<Order> {
        let request = OrderRequest::market(
            symbol.clone(),
            position.side.close_side(),
            position.quantity,
            position.leverage,
        );
        self.gateway.submit_order(request).await
    }

    /// Inbound event hook: an out-of-band signal (exchange push, webhook)
    /// indicates the symbol's position may have changed.
    pub async fn on_external_position_event(&self, symbol: &Symbol) -> Result<Option<Position>> {
        self.cache.refresh(symbol).await
    }

    pub fn cache(&self) -> &Arc<PositionCache> {
        &self.cache
    }
}
