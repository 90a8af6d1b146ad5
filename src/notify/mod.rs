//! Notification sink - best-effort alerts
//!
//! Pure effect boundary: `notify` never blocks beyond a bounded send and
//! never surfaces an error into the caller. Sinks log their own failures.

pub mod telegram;

use async_trait::async_trait;
use tracing::debug;

pub use telegram::TelegramNotifier;

/// Alert severity, rendered as a message prefix by concrete sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Success,
    Warning,
    Error,
    Trade,
}

impl AlertLevel {
    pub fn emoji(&self) -> &'static str {
        match self {
            AlertLevel::Info => "ℹ️",
            AlertLevel::Success => "✅",
            AlertLevel::Warning => "⚠️",
            AlertLevel::Error => "🚨",
            AlertLevel::Trade => "📊",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Info => write!(f, "INFO"),
            AlertLevel::Success => write!(f, "SUCCESS"),
            AlertLevel::Warning => write!(f, "WARNING"),
            AlertLevel::Error => write!(f, "ERROR"),
            AlertLevel::Trade => write!(f, "TRADE"),
        }
    }
}

/// Fire-and-forget notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a human-readable alert. Must not fail visibly.
    async fn notify(&self, level: AlertLevel, message: &str);
}

/// Sink used when notifications are disabled; alerts go to the debug log
/// only.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, level: AlertLevel, message: &str) {
        debug!("notification suppressed [{}]: {}", level, message);
    }
}
