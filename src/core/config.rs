//! Configuration - type-safe, validated config

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,

    /// Exchange connection settings
    pub exchange: ExchangeConfig,

    /// Trading risk limits
    pub risk: RiskLimits,

    /// Streaming / fan-out tuning
    pub stream: StreamConfig,

    /// Telegram notifications (disabled when absent)
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log level filter
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Use testnet endpoints
    pub testnet: bool,

    /// API key (falls back to BINANCE_API_KEY)
    pub api_key: Option<String>,

    /// API secret (falls back to BINANCE_API_SECRET)
    pub api_secret: Option<String>,

    /// recvWindow for signed requests, milliseconds
    pub recv_window_ms: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            testnet: true, // default to testnet for safety
            api_key: None,
            api_secret: None,
            recv_window_ms: 5000,
        }
    }
}

/// Risk limits consumed by the validator. Read-only snapshot during
/// placement; replaced wholesale through the settings-update path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Upper leverage bound (exchange hard cap is 125)
    pub max_leverage: u32,

    /// Largest permitted order quantity
    pub max_quantity: Decimal,

    /// Maximum concurrent open positions
    pub max_positions: usize,

    /// Symbols the service is allowed to trade
    pub allowed_symbols: Vec<String>,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_leverage: 125,
            max_quantity: Decimal::ONE,
            max_positions: 5,
            allowed_symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Nominal mark-price poll interval, milliseconds
    pub poll_interval_ms: u64,

    /// Backoff multiplier applied to the interval after a failed tick
    pub error_backoff_multiplier: u32,

    /// PnL delta that triggers a position-update notification
    pub pnl_alert_threshold: Decimal,
}

impl StreamConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            error_backoff_multiplier: 5,
            pnl_alert_threshold: Decimal::from(100),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token
    pub bot_token: String,

    /// Destination chat
    pub chat_id: String,
}

impl Config {
    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> crate::core::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| crate::core::Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| crate::core::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Fill API credentials from the environment when the file omits them.
    pub fn with_env_credentials(mut self) -> Self {
        if self.exchange.api_key.is_none() {
            self.exchange.api_key = std::env::var("BINANCE_API_KEY").ok();
        }
        if self.exchange.api_secret.is_none() {
            self.exchange.api_secret = std::env::var("BINANCE_API_SECRET").ok();
        }
        self
    }
}
