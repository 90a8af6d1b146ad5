//! Subscription registry and fan-out broadcaster
//!
//! Maps a symbol to the set of live client channels interested in it and
//! runs one streaming task per subscribed symbol. The transport layer owns
//! the receiving half of each channel and must unsubscribe a channel from
//! every symbol when it closes.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::config::StreamConfig;
use crate::core::types::{PositionSide, Symbol};
use crate::exchange::ExchangeGateway;

/// Message fanned out to stream subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamUpdate {
    Price {
        symbol: Symbol,
        price: Decimal,
    },
    Position {
        symbol: Symbol,
        side: PositionSide,
        quantity: Decimal,
        unrealized_pnl: Decimal,
    },
}

/// Subscriber handle held by the transport layer.
///
/// The registry keeps only the sending half plus an identity; the receiver
/// stays with the owning connection. Dropping the receiver is how the
/// transport signals closure.
pub struct ClientChannel {
    id: Uuid,
    tx: mpsc::Sender<StreamUpdate>,
}

impl ClientChannel {
    /// Create a channel pair; the receiver goes to the transport layer.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StreamUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

struct RegistryInner {
    /// symbol -> channel id -> sender
    members: HashMap<Symbol, HashMap<Uuid, mpsc::Sender<StreamUpdate>>>,
    /// Symbols with a live streaming task. A task removes itself here on
    /// exit, so a resubscribe racing an emptied symbol never double-spawns.
    streaming: HashSet<Symbol>,
}

/// State shared between the registry handle and its streaming tasks.
struct Shared {
    gateway: Arc<dyn ExchangeGateway>,
    inner: Mutex<RegistryInner>,
    poll_interval: Duration,
    error_backoff: Duration,
}

/// Symbol-keyed subscription registry with per-symbol streaming tasks.
pub struct SubscriptionRegistry {
    shared: Arc<Shared>,
}

impl SubscriptionRegistry {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, config: &StreamConfig) -> Self {
        let poll_interval = config.poll_interval();
        Self {
            shared: Arc::new(Shared {
                gateway,
                inner: Mutex::new(RegistryInner {
                    members: HashMap::new(),
                    streaming: HashSet::new(),
                }),
                poll_interval,
                error_backoff: poll_interval * config.error_backoff_multiplier.max(1),
            }),
        }
    }

    /// Register a channel for a symbol. The first subscriber of a symbol
    /// starts its streaming task; later subscribers share it.
    pub fn subscribe(&self, symbol: &Symbol, channel: &ClientChannel) {
        let spawn_task = {
            let mut inner = self.shared.inner.lock();
            inner
                .members
                .entry(symbol.clone())
                .or_default()
                .insert(channel.id, channel.tx.clone());
            inner.streaming.insert(symbol.clone())
        };

        info!("Subscribed {} to {}", channel.id, symbol);

        if spawn_task {
            let shared = Arc::clone(&self.shared);
            let symbol = symbol.clone();
            tokio::spawn(async move {
                stream_symbol(shared, symbol).await;
            });
        }
    }

    /// Remove a channel from a symbol. The symbol entry disappears with its
    /// last member; the streaming task notices on its next tick.
    pub fn unsubscribe(&self, symbol: &Symbol, channel_id: Uuid) {
        let mut inner = self.shared.inner.lock();
        if let Some(set) = inner.members.get_mut(symbol) {
            set.remove(&channel_id);
            if set.is_empty() {
                inner.members.remove(symbol);
            }
            info!("Unsubscribed {} from {}", channel_id, symbol);
        }
    }

    /// Deliver an update to every subscriber of the symbol.
    pub fn broadcast(&self, symbol: &Symbol, update: StreamUpdate) {
        self.shared.broadcast(symbol, update);
    }

    pub fn subscriber_count(&self, symbol: &Symbol) -> usize {
        self.shared.subscriber_count(symbol)
    }

    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.shared.inner.lock().members.keys().cloned().collect()
    }

    #[cfg(test)]
    fn is_streaming(&self, symbol: &Symbol) -> bool {
        self.shared.inner.lock().streaming.contains(symbol)
    }
}

impl Shared {
    fn subscriber_count(&self, symbol: &Symbol) -> usize {
        self.inner
            .lock()
            .members
            .get(symbol)
            .map_or(0, |set| set.len())
    }

    /// Iterates a snapshot of the member set so concurrent subscribe and
    /// unsubscribe never race the pass; channels whose receiver is gone are
    /// pruned under the lock afterwards. A full channel only loses this
    /// tick's message.
    fn broadcast(&self, symbol: &Symbol, update: StreamUpdate) {
        let snapshot: Vec<(Uuid, mpsc::Sender<StreamUpdate>)> = {
            let inner = self.inner.lock();
            match inner.members.get(symbol) {
                Some(set) => set.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for (id, tx) in &snapshot {
            match tx.try_send(update.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Subscriber {} lagging on {}, update dropped", id, symbol);
                }
            }
        }

        if !dead.is_empty() {
            let mut inner = self.inner.lock();
            if let Some(set) = inner.members.get_mut(symbol) {
                for id in &dead {
                    set.remove(id);
                    info!("Pruned dead channel {} from {}", id, symbol);
                }
                if set.is_empty() {
                    inner.members.remove(symbol);
                }
            }
        }
    }
}

/// Per-symbol streaming loop: poll the mark price on the nominal cadence
/// and fan it out. Termination is cooperative - the task checks membership
/// each tick and exits once the last subscriber is gone.
async fn stream_symbol(shared: Arc<Shared>, symbol: Symbol) {
    debug!("Streaming task started for {}", symbol);

    loop {
        // Exit decision and `streaming` cleanup happen under one lock:
        // a concurrent subscribe either sees the member entry (task keeps
        // running) or sees the marker already gone and spawns a fresh task.
        {
            let mut inner = shared.inner.lock();
            if !inner.members.contains_key(&symbol) {
                inner.streaming.remove(&symbol);
                break;
            }
        }

        match shared.gateway.get_mark_price(&symbol).await {
            Ok(price) => {
                shared.broadcast(
                    &symbol,
                    StreamUpdate::Price {
                        symbol: symbol.clone(),
                        price,
                    },
                );
                tokio::time::sleep(shared.poll_interval).await;
            }
            Err(e) => {
                // A bad tick must not drop subscribers; back off and keep
                // the task alive.
                warn!("Price poll failed for {}: {}", symbol, e);
                tokio::time::sleep(shared.error_backoff).await;
            }
        }
    }

    debug!("Streaming task stopped for {}", symbol);
}
