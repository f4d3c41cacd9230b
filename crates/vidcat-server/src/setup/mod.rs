//! Process wiring: database, storage and the catalog service.

pub mod database;
pub mod server;
pub mod storage;

use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;
use vidcat_core::Config;
use vidcat_db::{CatalogStore, VideoRepository};
use vidcat_services::CatalogService;

pub struct AppContext {
    pub pool: PgPool,
    pub service: CatalogService,
}

/// Connect the database, run migrations and build the catalog service.
pub async fn initialize_app(config: &Config) -> Result<AppContext> {
    let pool = database::setup_database(config).await?;
    let store: Arc<dyn CatalogStore> = Arc::new(VideoRepository::new(pool.clone()));
    let deletion = storage::setup_deletion(config, store.clone()).await?;

    let service = CatalogService::new(store, deletion, config.deletion.default_deadline);
    tracing::info!(
        environment = %config.environment,
        storage_bypassed = service.deletion().storage_bypassed(),
        "Catalog service initialized"
    );

    Ok(AppContext { pool, service })
}
