use std::sync::Arc;

use vidcat_core::models::{FinalizedEvent, RegisteredEvent};
use vidcat_core::{AppError, VideoPatch};
use vidcat_db::{CatalogStore, MergeOutcome};

/// Folds registration and finalization events into catalog records.
///
/// Events may arrive in either order and more than once. Each one becomes a
/// [`VideoPatch`] merged into the record in a single store transaction, so
/// replays settle as [`MergeOutcome::Unchanged`] and both orders converge.
#[derive(Clone)]
pub struct LifecycleReconciler {
    store: Arc<dyn CatalogStore>,
}

impl LifecycleReconciler {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Create the record with status `processing`, or fill its empty
    /// descriptive fields and escalate its visibility.
    #[tracing::instrument(skip(self, event), fields(event.stream = "registered", event.external_id = %event.external_id))]
    pub async fn handle_registered(&self, event: &RegisteredEvent) -> Result<MergeOutcome, AppError> {
        let patch = VideoPatch::from(event);
        if let Err(e) = patch.require_owner() {
            tracing::warn!(error = %e, "Rejecting registration without owner");
            return Err(e);
        }
        self.apply("registered", patch).await
    }

    /// Create a placeholder if needed, then take the manifest and media
    /// metadata verbatim and advance the record to `ready`. The owner is
    /// optional here; a later registration fills it in.
    #[tracing::instrument(skip(self, event), fields(event.stream = "finalized", event.external_id = %event.external_id))]
    pub async fn handle_finalized(&self, event: &FinalizedEvent) -> Result<MergeOutcome, AppError> {
        if event.manifest_url().is_none() {
            tracing::warn!("Finalization event carries no manifest URL");
        }
        self.apply("finalized", VideoPatch::from(event)).await
    }

    async fn apply(&self, stream: &'static str, patch: VideoPatch) -> Result<MergeOutcome, AppError> {
        if let Err(e) = patch.validate_identity() {
            tracing::warn!(stream, error = %e, "Rejecting event without identity");
            return Err(e);
        }

        let start = std::time::Instant::now();
        let outcome = self.store.merge_by_external_id(&patch).await?;
        let video = outcome.video();

        tracing::info!(
            stream,
            video_id = video.id,
            outcome = outcome.label(),
            status = %video.fields.status,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Lifecycle event merged"
        );

        Ok(outcome)
    }
}
