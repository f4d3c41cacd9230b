use async_trait::async_trait;
use vidcat_core::models::{NewVideo, Video};
use vidcat_core::{AppError, VideoPatch};

/// Result of folding an event into the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// No record existed; one was created from the event.
    Created(Video),
    /// The record existed and at least one field changed.
    Updated(Video),
    /// The record already reflected everything the event carries.
    Unchanged(Video),
}

impl MergeOutcome {
    pub fn video(&self) -> &Video {
        match self {
            MergeOutcome::Created(v) | MergeOutcome::Updated(v) | MergeOutcome::Unchanged(v) => v,
        }
    }

    pub fn into_video(self) -> Video {
        match self {
            MergeOutcome::Created(v) | MergeOutcome::Updated(v) | MergeOutcome::Unchanged(v) => v,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, MergeOutcome::Unchanged(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            MergeOutcome::Created(_) => "created",
            MergeOutcome::Updated(_) => "updated",
            MergeOutcome::Unchanged(_) => "unchanged",
        }
    }
}

/// Persistence contract for catalog records.
///
/// Records are addressed either by the internal key or by the unique external
/// asset id.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Video>, AppError>;

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Video>, AppError>;

    /// Insert a new record. Fails if the external id is already taken.
    async fn create(&self, video: NewVideo) -> Result<Video, AppError>;

    /// Persist every mergeable field of an existing record.
    async fn save(&self, video: &Video) -> Result<Video, AppError>;

    /// Remove the row permanently. Returns `false` when it did not exist.
    async fn hard_delete(&self, id: i64) -> Result<bool, AppError>;

    /// Create-or-merge keyed by the patch's external id, as one atomic
    /// read-modify-write. Concurrent calls for the same external id serialize.
    async fn merge_by_external_id(&self, patch: &VideoPatch) -> Result<MergeOutcome, AppError>;
}
