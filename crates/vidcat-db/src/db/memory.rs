//! In-process catalog store.
//!
//! Behaves like [`VideoRepository`](super::video::VideoRepository): merges hold
//! one lock for the whole read-modify-write, so concurrent merges for the same
//! external id serialize. Store failures can be injected per operation.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use vidcat_core::models::{NewVideo, Video};
use vidcat_core::{merge_video, AppError, VideoPatch};

use super::store::{CatalogStore, MergeOutcome};

#[derive(Default)]
struct Inner {
    videos: BTreeMap<i64, Video>,
    next_id: i64,
    fail_merges: bool,
    fail_deletes: bool,
}

impl Inner {
    fn by_external_id(&self, external_id: &str) -> Option<&Video> {
        self.videos.values().find(|v| v.external_id == external_id)
    }

    fn insert(&mut self, video: NewVideo) -> Video {
        self.next_id += 1;
        let now = Utc::now();
        let created = Video {
            id: self.next_id,
            external_id: video.external_id,
            owner_id: video.owner_id,
            fields: video.fields,
            created_at: now,
            updated_at: now,
        };
        self.videos.insert(created.id, created.clone());
        created
    }
}

fn store_failure() -> AppError {
    AppError::Database(sqlx::Error::PoolTimedOut)
}

#[derive(Default)]
pub struct InMemoryCatalogStore {
    inner: Mutex<Inner>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.videos.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.videos.is_empty()
    }

    pub async fn all(&self) -> Vec<Video> {
        self.inner.lock().await.videos.values().cloned().collect()
    }

    /// Every merge fails with a database error while set.
    pub async fn set_fail_merges(&self, fail: bool) {
        self.inner.lock().await.fail_merges = fail;
    }

    /// Every hard delete fails with a database error while set.
    pub async fn set_fail_deletes(&self, fail: bool) {
        self.inner.lock().await.fail_deletes = fail;
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Video>, AppError> {
        Ok(self.inner.lock().await.videos.get(&id).cloned())
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Video>, AppError> {
        Ok(self.inner.lock().await.by_external_id(external_id).cloned())
    }

    async fn create(&self, video: NewVideo) -> Result<Video, AppError> {
        let mut inner = self.inner.lock().await;
        if inner.by_external_id(&video.external_id).is_some() {
            return Err(AppError::Internal(format!(
                "Video with external id {} already exists",
                video.external_id
            )));
        }
        Ok(inner.insert(video))
    }

    async fn save(&self, video: &Video) -> Result<Video, AppError> {
        let mut inner = self.inner.lock().await;
        let stored = inner
            .videos
            .get_mut(&video.id)
            .ok_or_else(|| AppError::NotFound(format!("Video {} not found", video.id)))?;
        stored.fields = video.fields.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn hard_delete(&self, id: i64) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().await;
        if inner.fail_deletes {
            return Err(store_failure());
        }
        Ok(inner.videos.remove(&id).is_some())
    }

    async fn merge_by_external_id(&self, patch: &VideoPatch) -> Result<MergeOutcome, AppError> {
        patch.validate_identity()?;
        let mut inner = self.inner.lock().await;
        if inner.fail_merges {
            return Err(store_failure());
        }

        let found = inner.by_external_id(&patch.external_id).cloned();
        let existing = match found {
            Some(video) => video,
            None => return Ok(MergeOutcome::Created(inner.insert(patch.seed()))),
        };

        let mut merged = existing.clone();
        if !merge_video(&mut merged, patch) {
            return Ok(MergeOutcome::Unchanged(existing));
        }
        merged.updated_at = Utc::now();
        inner.videos.insert(merged.id, merged.clone());
        Ok(MergeOutcome::Updated(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidcat_core::models::VideoStatus;

    fn patch(external_id: &str, title: &str) -> VideoPatch {
        VideoPatch {
            external_id: external_id.to_string(),
            owner_id: "owner".to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn merge_creates_then_updates_then_settles() {
        let store = InMemoryCatalogStore::new();

        let created = store
            .merge_by_external_id(&VideoPatch {
                external_id: "u1".to_string(),
                owner_id: "owner".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(matches!(created, MergeOutcome::Created(_)));
        assert_eq!(created.video().fields.status, VideoStatus::Processing);

        let updated = store.merge_by_external_id(&patch("u1", "Clip")).await.unwrap();
        assert!(matches!(updated, MergeOutcome::Updated(_)));
        assert_eq!(updated.video().fields.title, "Clip");

        let again = store.merge_by_external_id(&patch("u1", "Clip")).await.unwrap();
        assert!(again.is_unchanged());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn merge_rejects_missing_identity() {
        let store = InMemoryCatalogStore::new();
        let result = store.merge_by_external_id(&patch("", "Clip")).await;
        assert!(matches!(result, Err(AppError::InvalidEvent(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_external_id() {
        let store = InMemoryCatalogStore::new();
        store.create(patch("u1", "A").seed()).await.unwrap();
        assert!(store.create(patch("u1", "B").seed()).await.is_err());
    }

    #[tokio::test]
    async fn injected_delete_failure_keeps_row() {
        let store = InMemoryCatalogStore::new();
        let video = store.create(patch("u1", "A").seed()).await.unwrap();

        store.set_fail_deletes(true).await;
        assert!(matches!(
            store.hard_delete(video.id).await,
            Err(AppError::Database(_))
        ));
        assert!(store.find_by_id(video.id).await.unwrap().is_some());

        store.set_fail_deletes(false).await;
        assert!(store.hard_delete(video.id).await.unwrap());
        assert!(!store.hard_delete(video.id).await.unwrap());
    }
}
