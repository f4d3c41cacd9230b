use anyhow::{Context, Result};
use std::sync::Arc;
use vidcat_core::Config;
use vidcat_db::CatalogStore;
use vidcat_services::{DeletionOrchestrator, StorageGateway};
use vidcat_storage::create_storage;

/// Build the deletion orchestrator.
///
/// A storage backend that cannot be built is fatal unless
/// `CATALOG_DELETE_WITHOUT_STORAGE` is set, in which case deletions only
/// remove catalog rows.
pub async fn setup_deletion(
    config: &Config,
    store: Arc<dyn CatalogStore>,
) -> Result<DeletionOrchestrator> {
    tracing::info!(backend = %config.storage.backend, "Initializing storage...");

    match create_storage(&config.storage).await {
        Ok(storage) => {
            tracing::info!(
                backend = %storage.backend_type(),
                "Storage initialized"
            );
            let gateway = StorageGateway::new(storage, &config.gateway);
            Ok(DeletionOrchestrator::new(store, gateway))
        }
        Err(e) if config.deletion.allow_without_storage => {
            tracing::warn!(
                error = %e,
                "Storage unavailable; continuing in database-only deletion mode"
            );
            Ok(DeletionOrchestrator::database_only(store))
        }
        Err(e) => Err(e).context("Failed to initialize storage"),
    }
}
