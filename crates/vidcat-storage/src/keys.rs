//! Storage key layout for objects derived from a catalog record.

use crate::traits::{StorageError, StorageResult};

/// Path segment that introduces the rendition folder in manifest URLs.
pub const RENDITION_MARKER: &str = "hls";
pub const THUMBNAIL_ROOT: &str = "thumbnails";
pub const ASSET_ROOT: &str = "videos";

pub fn thumbnail_key(owner_id: &str, external_id: &str) -> String {
    format!("{}/{}/{}.jpg", THUMBNAIL_ROOT, owner_id, external_id)
}

/// Rendition folder used when the manifest URL cannot be parsed.
pub fn fallback_rendition_prefix(owner_id: &str, external_id: &str) -> String {
    format!("{}/{}/{}", RENDITION_MARKER, owner_id, external_id)
}

/// Folder reserved for any other object derived from the asset.
pub fn asset_prefix(owner_id: &str, external_id: &str) -> String {
    format!("{}/{}/{}", ASSET_ROOT, owner_id, external_id)
}

/// Extracts `hls/{a}/{b}` from a manifest URL such as
/// `https://cdn.example.com/media/hls/{a}/{b}/master.m3u8`.
///
/// The scheme, host, query and fragment are ignored. Returns `None` when the
/// marker is missing or not followed by two usable segments.
pub fn rendition_prefix_from_manifest(manifest_url: &str) -> Option<String> {
    let without_query = manifest_url.split(['?', '#']).next().unwrap_or_default();
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => without_query,
    };

    let segments: Vec<&str> = path.split('/').collect();
    let marker = segments.iter().position(|s| *s == RENDITION_MARKER)?;
    let first = segments.get(marker + 1)?;
    let second = segments.get(marker + 2)?;

    if !is_plain_segment(first) || !is_plain_segment(second) {
        return None;
    }

    Some(format!("{}/{}/{}", RENDITION_MARKER, first, second))
}

fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".."
}

/// Strips leading slashes and rejects keys that could escape their folder.
pub fn normalize_key(raw: &str) -> StorageResult<String> {
    let key = raw.trim().trim_start_matches('/');
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty storage key".to_string()));
    }
    if key.split('/').any(|s| s == "..") {
        return Err(StorageError::InvalidKey(format!(
            "storage key contains a parent segment: {}",
            raw
        )));
    }
    Ok(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_keys() {
        assert_eq!(thumbnail_key("user123", "u1"), "thumbnails/user123/u1.jpg");
        assert_eq!(fallback_rendition_prefix("user123", "u1"), "hls/user123/u1");
        assert_eq!(asset_prefix("user123", "u1"), "videos/user123/u1");
    }

    #[test]
    fn parses_rendition_prefix() {
        assert_eq!(
            rendition_prefix_from_manifest("https://x/hls/user123/u1/master.m3u8").as_deref(),
            Some("hls/user123/u1")
        );
        assert_eq!(
            rendition_prefix_from_manifest(
                "https://acct.blob.core.windows.net/videos/hls/o/a/master.m3u8?sv=2024&sig=abc"
            )
            .as_deref(),
            Some("hls/o/a")
        );
        assert_eq!(
            rendition_prefix_from_manifest("hls/o/a/master.m3u8").as_deref(),
            Some("hls/o/a")
        );
    }

    #[test]
    fn host_named_like_marker_is_ignored() {
        assert_eq!(
            rendition_prefix_from_manifest("https://hls/cdn/hls/o/a/master.m3u8").as_deref(),
            Some("hls/o/a")
        );
    }

    #[test]
    fn unparsable_manifest_urls() {
        assert_eq!(rendition_prefix_from_manifest(""), None);
        assert_eq!(rendition_prefix_from_manifest("https://x/dash/o/a/x.mpd"), None);
        assert_eq!(rendition_prefix_from_manifest("https://x/hls/o"), None);
        assert_eq!(rendition_prefix_from_manifest("https://x/hls//a/m.m3u8"), None);
        assert_eq!(rendition_prefix_from_manifest("https://x/hls/../a/m.m3u8"), None);
    }

    #[test]
    fn normalizes_keys() {
        assert_eq!(normalize_key("/raw/o/u1.mp4").unwrap(), "raw/o/u1.mp4");
        assert!(matches!(normalize_key("  "), Err(StorageError::InvalidKey(_))));
        assert!(matches!(
            normalize_key("raw/../../etc/passwd"),
            Err(StorageError::InvalidKey(_))
        ));
    }
}
