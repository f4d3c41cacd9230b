//! Complete deletion of a catalog record.
//!
//! Stored objects go first and the row goes last, so a record is never missing
//! while objects it points to still exist. The storage pass is best effort:
//! absent objects are skipped, individual failures are recorded and the pass
//! continues. Only a store failure on the final row delete, or running out of
//! time, fails the call; both leave the row in place so the call can be
//! retried.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use vidcat_core::models::Video;
use vidcat_core::AppError;
use vidcat_db::CatalogStore;
use vidcat_storage::keys::{
    asset_prefix, fallback_rendition_prefix, normalize_key, rendition_prefix_from_manifest,
    thumbnail_key,
};
use vidcat_storage::{StorageError, StorageGateway};

/// An object or prefix that could not be cleaned up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageFailure {
    pub location: String,
    pub error: String,
}

/// Storage locations owned by one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionPlan {
    /// Individual objects, each checked for existence before deleting.
    pub objects: Vec<String>,
    /// Folders purged through paginated listing.
    pub prefixes: Vec<String>,
    /// Locations on the record that are not usable storage keys.
    pub rejected: Vec<StorageFailure>,
}

impl DeletionPlan {
    pub fn for_video(video: &Video) -> Self {
        let owner = video.owner_id.trim();
        let external = video.external_id.as_str();
        let mut plan = DeletionPlan::default();

        if let Some(raw) = video.fields.raw_object_path.as_deref() {
            match normalize_key(raw) {
                Ok(key) => plan.push_object(key),
                Err(e) => {
                    tracing::warn!(raw_object_path = %raw, error = %e, "Raw object path is not a storage key");
                    plan.rejected.push(StorageFailure {
                        location: raw.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        // Finalized but never registered: owner-scoped keys cannot be built.
        let owned = !owner.is_empty();
        if owned {
            plan.push_object(thumbnail_key(owner, external));
        } else {
            tracing::warn!(external_id = %external, "Record has no owner, skipping owner-scoped locations");
        }

        let rendition = video
            .fields
            .manifest_url
            .as_deref()
            .and_then(rendition_prefix_from_manifest)
            .or_else(|| owned.then(|| fallback_rendition_prefix(owner, external)));
        if let Some(rendition) = rendition {
            plan.push_prefix(rendition);
        }
        if owned {
            plan.push_prefix(asset_prefix(owner, external));
        }

        plan
    }

    fn push_object(&mut self, key: String) {
        if !self.objects.contains(&key) {
            self.objects.push(key);
        }
    }

    fn push_prefix(&mut self, prefix: String) {
        if !self.prefixes.contains(&prefix) {
            self.prefixes.push(prefix);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionOutcome {
    Complete,
    PartialStorageFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixReport {
    pub prefix: String,
    pub deleted: usize,
}

/// What a completed deletion removed and what it left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub video_id: i64,
    pub external_id: String,
    pub outcome: DeletionOutcome,
    pub objects_deleted: usize,
    /// Objects already absent, so no delete was issued.
    pub objects_skipped: usize,
    pub prefixes: Vec<PrefixReport>,
    pub failures: Vec<StorageFailure>,
    /// Storage was not touched because no storage client is available.
    pub storage_bypassed: bool,
}

impl DeletionReport {
    fn new(video: &Video) -> Self {
        Self {
            video_id: video.id,
            external_id: video.external_id.clone(),
            outcome: DeletionOutcome::Complete,
            objects_deleted: 0,
            objects_skipped: 0,
            prefixes: Vec::new(),
            failures: Vec::new(),
            storage_bypassed: false,
        }
    }

    pub fn objects_deleted_under_prefixes(&self) -> usize {
        self.prefixes.iter().map(|p| p.deleted).sum()
    }
}

fn deadline_exceeded(video: &Video) -> AppError {
    AppError::DeadlineExceeded(format!(
        "Deadline reached while deleting stored objects of video {}",
        video.id
    ))
}

#[derive(Clone)]
pub struct DeletionOrchestrator {
    store: Arc<dyn CatalogStore>,
    storage: Option<StorageGateway>,
}

impl DeletionOrchestrator {
    pub fn new(store: Arc<dyn CatalogStore>, storage: StorageGateway) -> Self {
        Self {
            store,
            storage: Some(storage),
        }
    }

    /// Deletes rows without touching storage. Objects of deleted records are
    /// orphaned; only for running while the storage client is unavailable.
    pub fn database_only(store: Arc<dyn CatalogStore>) -> Self {
        tracing::warn!("Deletion running without storage, stored objects will be orphaned");
        Self {
            store,
            storage: None,
        }
    }

    pub fn storage_bypassed(&self) -> bool {
        self.storage.is_none()
    }

    /// Removes the record's stored objects, then the record itself.
    ///
    /// Returns `NotFound` when the record does not exist, so repeating a
    /// finished deletion makes no storage calls.
    #[tracing::instrument(skip(self), fields(video.id = id))]
    pub async fn delete_completely(
        &self,
        id: i64,
        deadline: Instant,
    ) -> Result<DeletionReport, AppError> {
        let start = std::time::Instant::now();
        let video = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Video {} not found", id)))?;

        let mut report = DeletionReport::new(&video);
        match &self.storage {
            Some(gateway) => self.purge_storage(gateway, &video, deadline, &mut report).await?,
            None => {
                tracing::warn!(
                    external_id = %video.external_id,
                    "Skipping storage cleanup, storage client unavailable"
                );
                report.storage_bypassed = true;
            }
        }

        match self.store.hard_delete(id).await {
            Ok(true) => {}
            Ok(false) => return Err(AppError::NotFound(format!("Video {} not found", id))),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    external_id = %video.external_id,
                    "Failed to delete catalog row after storage cleanup"
                );
                return Err(e);
            }
        }

        if !report.failures.is_empty() {
            report.outcome = DeletionOutcome::PartialStorageFailure;
        }

        tracing::info!(
            external_id = %video.external_id,
            outcome = ?report.outcome,
            objects_deleted = report.objects_deleted,
            objects_skipped = report.objects_skipped,
            prefix_objects_deleted = report.objects_deleted_under_prefixes(),
            failures = report.failures.len(),
            storage_bypassed = report.storage_bypassed,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Video deleted"
        );

        Ok(report)
    }

    async fn purge_storage(
        &self,
        gateway: &StorageGateway,
        video: &Video,
        deadline: Instant,
        report: &mut DeletionReport,
    ) -> Result<(), AppError> {
        let plan = DeletionPlan::for_video(video);
        report.failures.extend(plan.rejected.iter().cloned());

        for key in &plan.objects {
            match gateway.delete_if_exists(key, deadline).await {
                Ok(true) => report.objects_deleted += 1,
                Ok(false) => {
                    tracing::debug!(key = %key, "Object already absent");
                    report.objects_skipped += 1;
                }
                Err(StorageError::DeadlineExceeded) => return Err(deadline_exceeded(video)),
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "Failed to delete object, continuing");
                    report.failures.push(StorageFailure {
                        location: key.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        for prefix in &plan.prefixes {
            let purge = gateway.delete_prefix(prefix, deadline).await;
            if purge.hit_deadline() {
                return Err(deadline_exceeded(video));
            }

            report.failures.extend(purge.failures.iter().map(|f| StorageFailure {
                location: f.key.clone(),
                error: f.error.clone(),
            }));
            if let Some(e) = &purge.interrupted {
                report.failures.push(StorageFailure {
                    location: prefix.clone(),
                    error: e.to_string(),
                });
            }
            report.prefixes.push(PrefixReport {
                prefix: prefix.clone(),
                deleted: purge.deleted,
            });
        }

        Ok(())
    }
}
