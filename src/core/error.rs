//! Error handling - hierarchical errors with machine-checkable kinds

use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Meridian error hierarchy
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Exchange API errors (transient or permanent - surfaced identically)
    #[error("Exchange error: {0}")]
    Exchange(String),

    /// Risk limit violations, returned before any exchange call is made
    #[error(transparent)]
    Risk(#[from] RiskViolation),
}

/// Rejection reasons from the risk validator, in check order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskViolation {
    #[error("symbol {0} is not in the allow-list")]
    InvalidSymbol(String),

    #[error("leverage {0} is outside the permitted range")]
    InvalidLeverage(u32),

    #[error("quantity {0} is not a valid order size")]
    InvalidQuantity(Decimal),

    #[error("maximum concurrent positions reached (max: {0})")]
    PositionLimitExceeded(usize),
}
