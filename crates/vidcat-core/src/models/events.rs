//! Lifecycle event payloads.
//!
//! Both events are decoded leniently: producers that still use the upload
//! service's field names (`uploadId`, `userId`, `username`, `rawVideoPath`,
//! nested `hls.masterUrl`, `metadata`) are accepted alongside the catalog names,
//! and unknown fields are ignored. Tags are normalized here so the merge rules
//! only ever see an ordered list of trimmed, non-empty strings.

use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::TAG_SEPARATOR;
use crate::models::video::MediaMetadata;

/// Emitted by the upload service once the raw file is stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredEvent {
    #[serde(default, alias = "uploadId")]
    pub external_id: String,
    #[serde(default, alias = "userId", deserialize_with = "deserialize_null_default")]
    pub owner_id: String,
    #[serde(default, alias = "username")]
    pub owner_display_name: Option<String>,
    #[serde(default)]
    pub original_filename: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub is_private: bool,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "rawVideoPath")]
    pub raw_object_path: Option<String>,
}

/// Location of the adaptive-streaming rendition as nested by older producers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HlsRendition {
    #[serde(default)]
    pub master_url: Option<String>,
}

/// Emitted by the transcoder once renditions, thumbnail and metadata exist.
///
/// Descriptive fields are optional copies of the upload metadata so the
/// catalog can backfill when the registration event is late or lost.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedEvent {
    #[serde(default, alias = "uploadId")]
    pub external_id: String,
    #[serde(default, alias = "userId", deserialize_with = "deserialize_null_default")]
    pub owner_id: String,
    #[serde(default, alias = "username")]
    pub owner_display_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_private: Option<bool>,
    #[serde(default)]
    pub original_filename: Option<String>,
    #[serde(default, alias = "rawVideoPath")]
    pub raw_object_path: Option<String>,
    #[serde(default)]
    pub manifest_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hls: Option<HlsRendition>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default, alias = "metadata")]
    pub media_metadata: Option<MediaMetadata>,
}

impl FinalizedEvent {
    /// Manifest URL from the flat field, falling back to the nested `hls` block.
    pub fn manifest_url(&self) -> Option<&str> {
        let flat = self.manifest_url.as_deref().filter(|u| !u.trim().is_empty());
        flat.or_else(|| {
            self.hls
                .as_ref()
                .and_then(|h| h.master_url.as_deref())
                .filter(|u| !u.trim().is_empty())
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagsWire {
    Delimited(String),
    List(Vec<serde_json::Value>),
}

/// Accepts `"a, b"`, `["a", " b"]` or `null`; non-string list entries are dropped.
pub fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let tags = match Option::<TagsWire>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(TagsWire::Delimited(raw)) => normalize_tags(raw.split(TAG_SEPARATOR)),
        Some(TagsWire::List(items)) => {
            normalize_tags(items.iter().filter_map(serde_json::Value::as_str))
        }
    };
    Ok(tags)
}

/// Treats an explicit `null` like an absent field.
pub fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Trims each tag and drops empty ones, keeping the original order.
pub fn normalize_tags<'a>(raw: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    raw.into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_flags_and_owner_decode_as_unset() {
        let event: RegisteredEvent = serde_json::from_value(json!({
            "externalId": "u1",
            "ownerId": "user123",
            "isPrivate": null
        }))
        .unwrap();
        assert!(!event.is_private);

        let event: FinalizedEvent =
            serde_json::from_value(json!({"externalId": "u1", "ownerId": null})).unwrap();
        assert_eq!(event.owner_id, "");
    }

    #[test]
    fn tags_from_delimited_string() {
        let event: RegisteredEvent =
            serde_json::from_value(json!({"externalId": "u1", "tags": "a, b ,, c"})).unwrap();
        assert_eq!(event.tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn tags_from_list_keep_order() {
        let event: RegisteredEvent =
            serde_json::from_value(json!({"externalId": "u1", "tags": [" z", "a ", 7, ""]}))
                .unwrap();
        assert_eq!(event.tags, vec!["z", "a"]);
    }

    #[test]
    fn null_or_missing_tags_are_empty() {
        let event: FinalizedEvent =
            serde_json::from_value(json!({"externalId": "u1", "tags": null})).unwrap();
        assert!(event.tags.is_empty());
        let event: FinalizedEvent = serde_json::from_value(json!({"externalId": "u1"})).unwrap();
        assert!(event.tags.is_empty());
    }

    #[test]
    fn accepts_upload_service_field_names() {
        let event: RegisteredEvent = serde_json::from_value(json!({
            "uploadId": "u1",
            "userId": "user123",
            "username": "sam",
            "rawVideoPath": "raw/user123/u1.mp4",
            "isPrivate": true,
            "containerName": "videos"
        }))
        .unwrap();
        assert_eq!(event.external_id, "u1");
        assert_eq!(event.owner_id, "user123");
        assert_eq!(event.owner_display_name.as_deref(), Some("sam"));
        assert_eq!(event.raw_object_path.as_deref(), Some("raw/user123/u1.mp4"));
        assert!(event.is_private);
    }

    #[test]
    fn manifest_url_falls_back_to_nested_hls() {
        let event: FinalizedEvent = serde_json::from_value(json!({
            "uploadId": "u1",
            "hls": {"masterUrl": "https://x/hls/user123/u1/master.m3u8"},
            "metadata": {"duration": 12.5, "width": 1920}
        }))
        .unwrap();
        assert_eq!(
            event.manifest_url(),
            Some("https://x/hls/user123/u1/master.m3u8")
        );
        let media = event.media_metadata.unwrap();
        assert_eq!(media.duration, 12.5);
        assert_eq!(media.width, 1920);
        assert_eq!(media.height, 0);
    }

    #[test]
    fn flat_manifest_url_wins() {
        let event: FinalizedEvent = serde_json::from_value(json!({
            "externalId": "u1",
            "manifestUrl": "https://cdn/hls/a/b/master.m3u8",
            "hls": {"masterUrl": "https://old/hls/a/b/master.m3u8"}
        }))
        .unwrap();
        assert_eq!(event.manifest_url(), Some("https://cdn/hls/a/b/master.m3u8"));
    }
}
