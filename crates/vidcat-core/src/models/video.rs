use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::constants::PLACEHOLDER_TITLE;

/// Lifecycle status of a catalog record.
///
/// Status only moves forward: `registered` < `processing` < `ready`. `failed`
/// can be entered from any non-ready state and is only left by `ready`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "video_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Registered,
    #[default]
    Processing,
    Ready,
    Failed,
}

impl VideoStatus {
    fn rank(self) -> u8 {
        match self {
            VideoStatus::Registered => 0,
            VideoStatus::Processing => 1,
            VideoStatus::Failed => 2,
            VideoStatus::Ready => 3,
        }
    }

    /// Status after an event asks to move to `next`.
    pub fn advance_to(self, next: VideoStatus) -> VideoStatus {
        if next.rank() > self.rank() {
            next
        } else {
            self
        }
    }
}

impl Display for VideoStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VideoStatus::Registered => write!(f, "registered"),
            VideoStatus::Processing => write!(f, "processing"),
            VideoStatus::Ready => write!(f, "ready"),
            VideoStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Technical metadata reported by the transcoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaMetadata {
    pub duration: f64,
    pub file_size: i64,
    pub width: i32,
    pub height: i32,
    pub video_codec: String,
    pub video_bitrate: i64,
    pub audio_codec: String,
    pub audio_bitrate: i64,
    pub frame_rate: f64,
}

/// The event-mergeable part of a catalog record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoFields {
    pub owner_display_name: Option<String>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub is_private: bool,
    pub status: VideoStatus,
    pub original_filename: Option<String>,
    pub raw_object_path: Option<String>,
    pub manifest_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub media: Option<MediaMetadata>,
}

impl VideoFields {
    /// Fields of a freshly created record before any event data is merged in.
    pub fn placeholder() -> Self {
        Self {
            title: PLACEHOLDER_TITLE.to_string(),
            status: VideoStatus::Processing,
            ..Default::default()
        }
    }

    pub fn has_placeholder_title(&self) -> bool {
        is_unset_title(&self.title)
    }
}

/// A title counts as unset while it is blank or still the placeholder.
#[allow(clippy::ptr_arg)]
pub fn is_unset_title(title: &String) -> bool {
    let title = title.trim();
    title.is_empty() || title == PLACEHOLDER_TITLE
}

/// Catalog record, one per physical asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: i64,
    pub external_id: String,
    pub owner_id: String,
    #[serde(flatten)]
    pub fields: VideoFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A record that has not been assigned an internal key yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVideo {
    pub external_id: String,
    pub owner_id: String,
    pub fields: VideoFields,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_never_regresses_from_ready() {
        assert_eq!(
            VideoStatus::Ready.advance_to(VideoStatus::Processing),
            VideoStatus::Ready
        );
        assert_eq!(
            VideoStatus::Ready.advance_to(VideoStatus::Failed),
            VideoStatus::Ready
        );
        assert_eq!(
            VideoStatus::Registered.advance_to(VideoStatus::Processing),
            VideoStatus::Processing
        );
        assert_eq!(
            VideoStatus::Processing.advance_to(VideoStatus::Registered),
            VideoStatus::Processing
        );
    }

    #[test]
    fn failed_is_left_only_by_ready() {
        assert_eq!(
            VideoStatus::Failed.advance_to(VideoStatus::Processing),
            VideoStatus::Failed
        );
        assert_eq!(
            VideoStatus::Failed.advance_to(VideoStatus::Ready),
            VideoStatus::Ready
        );
    }

    #[test]
    fn placeholder_title_counts_as_unset() {
        let fields = VideoFields::placeholder();
        assert!(fields.has_placeholder_title());
        assert_eq!(fields.status, VideoStatus::Processing);
        assert!(is_unset_title(&"   ".to_string()));
        assert!(!is_unset_title(&"My Clip".to_string()));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&VideoStatus::Ready).unwrap();
        assert_eq!(json, "\"ready\"");
        assert_eq!(VideoStatus::Registered.to_string(), "registered");
    }
}
