use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres};
use vidcat_core::models::{MediaMetadata, NewVideo, Video, VideoFields, VideoStatus};
use vidcat_core::{merge_video, AppError, VideoPatch};

use super::store::{CatalogStore, MergeOutcome};
use super::transaction::TransactionGuard;

/// Row shape of the `videos` table.
#[derive(Debug, sqlx::FromRow)]
struct VideoRow {
    id: i64,
    external_id: String,
    owner_id: String,
    owner_display_name: Option<String>,
    title: String,
    description: String,
    category: String,
    tags: Vec<String>,
    is_private: bool,
    status: VideoStatus,
    original_filename: Option<String>,
    raw_object_path: Option<String>,
    manifest_url: Option<String>,
    thumbnail_url: Option<String>,
    media_metadata: Option<Json<MediaMetadata>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<VideoRow> for Video {
    fn from(row: VideoRow) -> Self {
        Video {
            id: row.id,
            external_id: row.external_id,
            owner_id: row.owner_id,
            fields: VideoFields {
                owner_display_name: row.owner_display_name,
                title: row.title,
                description: row.description,
                category: row.category,
                tags: row.tags,
                is_private: row.is_private,
                status: row.status,
                original_filename: row.original_filename,
                raw_object_path: row.raw_object_path,
                manifest_url: row.manifest_url,
                thumbnail_url: row.thumbnail_url,
                media: row.media_metadata.map(|Json(m)| m),
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}

/// PostgreSQL catalog repository
#[derive(Clone)]
pub struct VideoRepository {
    pool: PgPool,
}

impl VideoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn lock_by_external_id(
        conn: &mut PgConnection,
        external_id: &str,
    ) -> Result<Option<Video>, AppError> {
        let row = sqlx::query_as::<Postgres, VideoRow>(
            "SELECT * FROM videos WHERE external_id = $1 FOR UPDATE",
        )
        .bind(external_id)
        .fetch_optional(conn)
        .await?;

        Ok(row.map(Video::from))
    }

    /// Insert unless another transaction already created the record.
    async fn insert_if_absent(
        conn: &mut PgConnection,
        video: &NewVideo,
    ) -> Result<Option<Video>, AppError> {
        let fields = &video.fields;
        let row = sqlx::query_as::<Postgres, VideoRow>(
            r#"
            INSERT INTO videos (
                external_id, owner_id, owner_display_name, title, description, category,
                tags, is_private, status, original_filename, raw_object_path,
                manifest_url, thumbnail_url, media_metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (external_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&video.external_id)
        .bind(&video.owner_id)
        .bind(&fields.owner_display_name)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.category)
        .bind(&fields.tags)
        .bind(fields.is_private)
        .bind(fields.status)
        .bind(&fields.original_filename)
        .bind(&fields.raw_object_path)
        .bind(&fields.manifest_url)
        .bind(&fields.thumbnail_url)
        .bind(fields.media.clone().map(Json))
        .fetch_optional(conn)
        .await?;

        Ok(row.map(Video::from))
    }

    async fn update_video(conn: &mut PgConnection, video: &Video) -> Result<Option<Video>, AppError> {
        let fields = &video.fields;
        let row = sqlx::query_as::<Postgres, VideoRow>(
            r#"
            UPDATE videos
            SET owner_id = $2,
                owner_display_name = $3,
                title = $4,
                description = $5,
                category = $6,
                tags = $7,
                is_private = $8,
                status = $9,
                original_filename = $10,
                raw_object_path = $11,
                manifest_url = $12,
                thumbnail_url = $13,
                media_metadata = $14,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(video.id)
        .bind(&video.owner_id)
        .bind(&fields.owner_display_name)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.category)
        .bind(&fields.tags)
        .bind(fields.is_private)
        .bind(fields.status)
        .bind(&fields.original_filename)
        .bind(&fields.raw_object_path)
        .bind(&fields.manifest_url)
        .bind(&fields.thumbnail_url)
        .bind(fields.media.clone().map(Json))
        .fetch_optional(conn)
        .await?;

        Ok(row.map(Video::from))
    }
}

#[async_trait]
impl CatalogStore for VideoRepository {
    #[tracing::instrument(skip(self), fields(db.table = "videos", db.operation = "select", db.record_id = id))]
    async fn find_by_id(&self, id: i64) -> Result<Option<Video>, AppError> {
        let row = sqlx::query_as::<Postgres, VideoRow>("SELECT * FROM videos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Video::from))
    }

    #[tracing::instrument(skip(self), fields(db.table = "videos", db.operation = "select"))]
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Video>, AppError> {
        let row =
            sqlx::query_as::<Postgres, VideoRow>("SELECT * FROM videos WHERE external_id = $1")
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(Video::from))
    }

    #[tracing::instrument(skip(self, video), fields(db.table = "videos", db.operation = "insert", external_id = %video.external_id))]
    async fn create(&self, video: NewVideo) -> Result<Video, AppError> {
        let mut conn = self.pool.acquire().await?;
        match Self::insert_if_absent(&mut conn, &video).await {
            Ok(Some(created)) => Ok(created),
            Ok(None) => Err(AppError::Internal(format!(
                "Video with external id {} already exists",
                video.external_id
            ))),
            Err(AppError::Database(e)) if is_unique_violation(&e) => Err(AppError::Internal(
                format!("Video with external id {} already exists", video.external_id),
            )),
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(skip(self, video), fields(db.table = "videos", db.operation = "update", db.record_id = video.id))]
    async fn save(&self, video: &Video) -> Result<Video, AppError> {
        let mut conn = self.pool.acquire().await?;
        Self::update_video(&mut conn, video)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Video {} not found", video.id)))
    }

    #[tracing::instrument(skip(self), fields(db.table = "videos", db.operation = "delete", db.record_id = id))]
    async fn hard_delete(&self, id: i64) -> Result<bool, AppError> {
        let rows_affected = sqlx::query("DELETE FROM videos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }

    #[tracing::instrument(skip(self, patch), fields(db.table = "videos", db.operation = "merge", external_id = %patch.external_id))]
    async fn merge_by_external_id(&self, patch: &VideoPatch) -> Result<MergeOutcome, AppError> {
        patch.validate_identity()?;
        let external_id = patch.external_id.as_str();

        let mut tx = TransactionGuard::begin(&self.pool, "merge_by_external_id").await?;

        let existing = match Self::lock_by_external_id(tx.conn()?, external_id).await? {
            Some(video) => video,
            None => {
                let seed = patch.seed();
                if let Some(created) = Self::insert_if_absent(tx.conn()?, &seed).await? {
                    tx.commit().await?;
                    return Ok(MergeOutcome::Created(created));
                }
                // Lost the insert race; the winner's row is committed and visible now.
                Self::lock_by_external_id(tx.conn()?, external_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "Video {} vanished during merge",
                            external_id
                        ))
                    })?
            }
        };

        let mut merged = existing.clone();
        if !merge_video(&mut merged, patch) {
            tx.commit().await?;
            return Ok(MergeOutcome::Unchanged(existing));
        }

        let updated = Self::update_video(tx.conn()?, &merged)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Video {} vanished during merge", merged.id)))?;
        tx.commit().await?;

        Ok(MergeOutcome::Updated(updated))
    }
}
