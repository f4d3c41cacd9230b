use anyhow::Result;
use vidcat_core::Config;
use vidcat_services::CatalogService;
use vidcat_worker::{create_channels, ConsumerConfig, EventConsumerPool};

/// Run both event consumers until a shutdown signal arrives.
pub async fn run_consumers(config: &Config, service: CatalogService) -> Result<()> {
    let (registered, finalized) = create_channels(&config.channel).await?;
    let pool = EventConsumerPool::start(
        service,
        registered,
        finalized,
        ConsumerConfig::from_channel_config(&config.channel),
    );
    tracing::info!(
        requeue_on_store_failure = config.channel.requeue_on_store_failure,
        "Event consumers running"
    );

    shutdown_signal().await;
    pool.shutdown().await;
    tracing::info!("Event consumers stopped");
    Ok(())
}

/// Resolves on Ctrl+C (SIGINT) or SIGTERM.
///
/// A handler that cannot be installed is logged and never fires; the other
/// one still does.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
}
