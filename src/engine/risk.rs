//! Risk validator - ordered limit checks before any exchange call

use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::core::config::RiskLimits;
use crate::core::error::RiskViolation;
use crate::core::types::{OrderIntent, Position, Symbol};

/// Validate an order intent against the configured limits and a snapshot of
/// the open positions.
///
/// Checks run in a fixed order and short-circuit on the first failure, so a
/// multiply-invalid intent always reports the same violation. Pure
/// function: reads only, safe to call from any task.
pub fn validate(
    intent: &OrderIntent,
    limits: &RiskLimits,
    positions: &HashMap<Symbol, Position>,
) -> Result<(), RiskViolation> {
    if !limits
        .allowed_symbols
        .iter()
        .any(|s| s == intent.symbol.as_str())
    {
        return Err(RiskViolation::InvalidSymbol(intent.symbol.to_string()));
    }

    if intent.leverage < 1 || intent.leverage > limits.max_leverage {
        return Err(RiskViolation::InvalidLeverage(intent.leverage));
    }

    if intent.quantity <= Decimal::ZERO || intent.quantity > limits.max_quantity {
        return Err(RiskViolation::InvalidQuantity(intent.quantity));
    }

    // Adding to an existing position never counts against the limit.
    if !positions.contains_key(&intent.symbol) && positions.len() >= limits.max_positions {
        return Err(RiskViolation::PositionLimitExceeded(limits.max_positions));
    }

    Ok(())
}
