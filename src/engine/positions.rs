//! Position cache - local mirror of exchange-reported positions
//!
//! Single writer of Position records. Eventually consistent: every refresh
//! converges on what the exchange reports, so a `refresh` racing a
//! `refresh_all` is last-write-wins by design.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::core::Result;
use crate::core::config::StreamConfig;
use crate::core::types::{Position, Symbol};
use crate::exchange::ExchangeGateway;
use crate::notify::{AlertLevel, Notifier};
use crate::stream::{StreamUpdate, SubscriptionRegistry};

/// Mutex-guarded symbol -> Position map, refreshed from the gateway.
pub struct PositionCache {
    gateway: Arc<dyn ExchangeGateway>,
    notifier: Arc<dyn Notifier>,
    registry: Arc<SubscriptionRegistry>,
    positions: Mutex<HashMap<Symbol, Position>>,
    /// PnL delta below which a refresh stays silent, to avoid notification
    /// storms from normal price drift.
    pnl_alert_threshold: Decimal,
}

impl PositionCache {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        notifier: Arc<dyn Notifier>,
        registry: Arc<SubscriptionRegistry>,
        config: &StreamConfig,
    ) -> Self {
        Self {
            gateway,
            notifier,
            registry,
            positions: Mutex::new(HashMap::new()),
            pnl_alert_threshold: config.pnl_alert_threshold,
        }
    }

    /// Cached position for a symbol, if any.
    pub fn get(&self, symbol: &Symbol) -> Option<Position> {
        self.positions.lock().get(symbol).cloned()
    }

    /// Copy of the whole cache.
    pub fn snapshot(&self) -> HashMap<Symbol, Position> {
        self.positions.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.positions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.lock().is_empty()
    }

    /// Drop a symbol from the cache (confirmed close).
    pub fn remove(&self, symbol: &Symbol) -> Option<Position> {
        self.positions.lock().remove(symbol)
    }

    /// Re-read every position from the gateway and replace the map
    /// wholesale. Symbols the exchange no longer reports disappear, so the
    /// cache self-heals from manual liquidations and other external closes.
    pub async fn refresh_all(&self) -> Result<Vec<Position>> {
        let positions = self.gateway.get_all_positions().await?;

        let mut map = self.positions.lock();
        *map = positions
            .iter()
            .map(|p| (p.symbol.clone(), p.clone()))
            .collect();
        drop(map);

        info!("Position cache refreshed: {} open", positions.len());
        Ok(positions)
    }

    /// Re-read one symbol without disturbing the others. Used after an
    /// order fill (read-after-write) and for webhook-driven refreshes.
    pub async fn refresh(&self, symbol: &Symbol) -> Result<Option<Position>> {
        let fetched = self.gateway.get_position(symbol).await?;

        match fetched {
            Some(position) => {
                let previous = {
                    let mut map = self.positions.lock();
                    map.insert(symbol.clone(), position.clone())
                };

                self.registry.broadcast(
                    symbol,
                    StreamUpdate::Position {
                        symbol: symbol.clone(),
                        side: position.side,
                        quantity: position.quantity,
                        unrealized_pnl: position.unrealized_pnl,
                    },
                );

                if self.pnl_moved(previous.as_ref(), &position) {
                    self.notifier
                        .notify(
                            AlertLevel::Info,
                            &format!(
                                "Position update: {} {} PnL {}",
                                position.symbol, position.side, position.unrealized_pnl
                            ),
                        )
                        .await;
                }

                Ok(Some(position))
            }
            None => {
                let removed = self.positions.lock().remove(symbol);
                if removed.is_some() {
                    info!("Position gone on exchange, dropped from cache: {}", symbol);
                    self.notifier
                        .notify(AlertLevel::Info, &format!("Position closed: {}", symbol))
                        .await;
                }
                Ok(None)
            }
        }
    }

    /// A brand new position always notifies; an update only when the PnL
    /// moved by at least the configured threshold.
    fn pnl_moved(&self, previous: Option<&Position>, current: &Position) -> bool {
        match previous {
            None => true,
            Some(prev) => {
                (current.unrealized_pnl - prev.unrealized_pnl).abs() >= self.pnl_alert_threshold
            }
        }
    }
}
