//! Hookline webhook delivery service.
//!
//! Main entry point for the hookline daemon. Loads configuration, builds
//! the delivery service, and coordinates graceful shutdown.

mod config;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use hookline_core::RealClock;
use hookline_delivery::DeliveryService;
use tracing::info;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting hookline webhook delivery service");

    let config = Config::load()?;
    info!(
        require_https = config.require_https,
        max_retry_attempts = config.max_retry_attempts,
        retry_base_delay_ms = config.retry_base_delay_ms,
        "Configuration loaded"
    );

    let service = DeliveryService::new(config.to_service_config(), Arc::new(RealClock))?;
    info!("Hookline is ready to dispatch webhooks");

    shutdown_signal().await;
    info!("Shutdown signal received, starting graceful shutdown");

    service.shutdown();

    // Give in-flight delivery attempts time to resolve and be recorded.
    tokio::time::sleep(Duration::from_secs(5)).await;

    info!("Hookline shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,hookline=debug"))
        .expect("Invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true).with_thread_ids(true).with_thread_names(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
