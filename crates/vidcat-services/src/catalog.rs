use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use vidcat_core::models::{FinalizedEvent, RegisteredEvent, Video};
use vidcat_core::AppError;
use vidcat_db::CatalogStore;

use crate::deletion::{DeletionOrchestrator, DeletionReport};
use crate::reconciler::LifecycleReconciler;

/// Entry point for every catalog operation exposed to consumers and operators.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    reconciler: LifecycleReconciler,
    deletion: DeletionOrchestrator,
    default_deadline: Duration,
}

impl CatalogService {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        deletion: DeletionOrchestrator,
        default_deadline: Duration,
    ) -> Self {
        Self {
            reconciler: LifecycleReconciler::new(store.clone()),
            store,
            deletion,
            default_deadline,
        }
    }

    pub fn reconciler(&self) -> &LifecycleReconciler {
        &self.reconciler
    }

    pub fn deletion(&self) -> &DeletionOrchestrator {
        &self.deletion
    }

    /// Deadline for a deletion started now with the configured budget.
    pub fn default_deadline(&self) -> Instant {
        Instant::now() + self.default_deadline
    }

    pub async fn register_asset(&self, event: &RegisteredEvent) -> Result<Video, AppError> {
        Ok(self.reconciler.handle_registered(event).await?.into_video())
    }

    pub async fn finalize_asset(&self, event: &FinalizedEvent) -> Result<Video, AppError> {
        Ok(self.reconciler.handle_finalized(event).await?.into_video())
    }

    pub async fn delete_asset_completely(
        &self,
        id: i64,
        deadline: Instant,
    ) -> Result<DeletionReport, AppError> {
        self.deletion.delete_completely(id, deadline).await
    }

    pub async fn get_video(&self, id: i64) -> Result<Video, AppError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Video {} not found", id)))
    }

    pub async fn get_video_by_external_id(&self, external_id: &str) -> Result<Video, AppError> {
        self.store
            .find_by_external_id(external_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Video {} not found", external_id)))
    }
}
