//! Meridian - automated futures trading core
//!
//! Order/position lifecycle against a derivatives exchange plus real-time
//! price and position fan-out to subscribed clients.

// Public modules
pub mod core;
pub mod engine;
pub mod exchange;
pub mod notify;
pub mod stream;

// Re-exports
pub use crate::core::{Config, Error, Result, RiskViolation};
pub use engine::{CloseOutcome, OrderCoordinator, PositionCache};
pub use exchange::ExchangeGateway;
pub use notify::{AlertLevel, Notifier};
pub use stream::{ClientChannel, StreamUpdate, SubscriptionRegistry};
