//! Trading engine - risk checks, position cache, order coordination

pub mod coordinator;
pub mod positions;
pub mod risk;

pub use coordinator::{CloseOutcome, OrderCoordinator};
pub use positions::PositionCache;
