use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

use meridian::core::Config;
use meridian::engine::{OrderCoordinator, PositionCache};
use meridian::exchange::BinanceGateway;
use meridian::notify::{AlertLevel, Notifier, NullNotifier, TelegramNotifier};
use meridian::stream::SubscriptionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        Config::load(&config_path)?
    } else {
        Config::default()
    }
    .with_env_credentials();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},meridian=debug", config.app.log_level)));
    fmt().with_env_filter(filter).with_target(true).init();

    tracing::info!("Meridian trading service starting...");

    // Explicit dependency construction, no ambient globals: gateway and
    // notifier feed the registry, cache and coordinator.
    let gateway = Arc::new(BinanceGateway::new(&config.exchange)?);

    let notifier: Arc<dyn Notifier> = match &config.telegram {
        Some(telegram) => Arc::new(TelegramNotifier::new(telegram)),
        None => {
            tracing::info!("Telegram notifications disabled");
            Arc::new(NullNotifier)
        }
    };

    let registry = Arc::new(SubscriptionRegistry::new(gateway.clone(), &config.stream));
    let cache = Arc::new(PositionCache::new(
        gateway.clone(),
        notifier.clone(),
        registry.clone(),
        &config.stream,
    ));
    let coordinator = Arc::new(OrderCoordinator::new(
        gateway.clone(),
        cache.clone(),
        notifier.clone(),
        config.risk.clone(),
    ));

    // Prime the cache with whatever the exchange already holds.
    let positions = cache.refresh_all().await?;
    tracing::info!("Loaded {} open position(s)", positions.len());

    notifier
        .notify(AlertLevel::Success, "Trading service started")
        .await;

    // The transport layer (HTTP/WebSocket) plugs into `coordinator` and
    // `registry` here; the core itself just stays alive until shutdown.
    let _ = coordinator;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    notifier
        .notify(AlertLevel::Info, "Trading service stopped")
        .await;

    Ok(())
}
