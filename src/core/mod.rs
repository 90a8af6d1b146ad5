//! Core module - types, errors, configuration

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, RiskLimits, StreamConfig};
pub use error::{Error, Result, RiskViolation};
pub use types::*;
