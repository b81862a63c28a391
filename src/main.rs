use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use filevault::{Config, FileService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "filevault=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting filevault...");

    // Load configuration
    let config = Config::load()?;
    tracing::info!("Configuration loaded");

    // Open metadata index and blob storage
    let service = FileService::open(&config).await?;

    let max_age_secs = config.sweep.max_age_secs();
    let mut ticker = tokio::time::interval(Duration::from_secs(config.sweep.interval_secs.max(1)));
    tracing::info!(
        "Sweeping files older than {} days every {}s",
        config.sweep.max_age_days,
        config.sweep.interval_secs
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match service.sweep_stale(max_age_secs).await {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!("No stale files"),
                    Err(e) => tracing::error!("Stale sweep failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    service.metadata().pool().close().await;
    Ok(())
}
