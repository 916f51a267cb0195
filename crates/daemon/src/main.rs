//! Leaseq Daemon - Main Entry Point
//! Runs the clean scheduler for each configured queue until Ctrl+C

mod config;

use anyhow::{Context, Result};
use config::{DaemonConfig, LogFormat};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use leaseq_core::application::{shutdown_channel, CleanScheduler, WorkQueue};
use leaseq_core::port::AtomicStore;
use leaseq_infra_redis::RedisStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn init_logging(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("leaseq=info"))
        .context("Failed to create env filter")?;

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty())
            .init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration (before logging, which it selects)
    let config = DaemonConfig::from_env().context("Invalid configuration")?;

    // 2. Initialize logging
    init_logging(config.log_format)?;
    info!("Leaseq daemon v{} starting...", VERSION);
    info!(
        queues = ?config.queues,
        clean_interval_secs = config.clean_interval.as_secs(),
        "Configuration loaded"
    );

    // 3. Connect to the store
    let store: Arc<dyn AtomicStore> = Arc::new(
        RedisStore::connect(&config.redis_url)
            .await
            .context("Redis connection failed")?,
    );

    // 4. Wire one queue + scheduler per configured name
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let mut handles = Vec::with_capacity(config.queues.len());

    for name in &config.queues {
        let queue = Arc::new(
            WorkQueue::new(name.as_str(), store.clone())
                .with_context(|| format!("Invalid queue '{}'", name))?,
        );

        // Startup sweep reclaims anything abandoned while we were down
        let scheduler = CleanScheduler::new(queue, config.clean_interval);
        if let Err(e) = scheduler.run_now().await {
            error!(queue = %name, error = ?e, "Startup clean failed");
        }

        let token = shutdown_rx.clone();
        handles.push(tokio::spawn(scheduler.run(token)));
    }

    info!("✅ System ready. Sweeping {} queue(s)", handles.len());
    info!("Press Ctrl+C to shutdown");

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 6. Graceful shutdown
    shutdown_tx.shutdown();
    for handle in handles {
        if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
            error!("Clean scheduler did not stop within grace period");
        }
    }

    info!("Shutdown complete.");
    Ok(())
}
