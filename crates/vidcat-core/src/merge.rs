//! Field merge rules for lifecycle events.
//!
//! Registration and finalization events arrive in any order and may be
//! redelivered. Every catalog field has exactly one [`FieldPolicy`], and
//! [`merge`] folds an incoming [`VideoPatch`] into the stored fields one field at
//! a time. The reducer is pure, so the same patch applied twice is a no-op and
//! the two event kinds converge regardless of arrival order.

use crate::error::AppError;
use crate::models::{
    is_unset_title, FinalizedEvent, MediaMetadata, NewVideo, RegisteredEvent, Video,
    VideoFields, VideoStatus,
};

/// How an incoming value is combined with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Replace only while the stored value is empty or default.
    FillIfEmpty,
    /// Flags may be raised but never lowered.
    EscalateOnly,
    /// Any supplied value replaces the stored one.
    Authoritative,
}

/// Catalog fields touched by events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    OwnerId,
    OwnerDisplayName,
    Title,
    Description,
    Category,
    Tags,
    OriginalFilename,
    RawObjectPath,
    ThumbnailUrl,
    IsPrivate,
    ManifestUrl,
    MediaMetadata,
}

impl Field {
    pub const fn policy(self) -> FieldPolicy {
        match self {
            Field::IsPrivate => FieldPolicy::EscalateOnly,
            Field::ManifestUrl | Field::MediaMetadata => FieldPolicy::Authoritative,
            Field::OwnerId
            | Field::OwnerDisplayName
            | Field::Title
            | Field::Description
            | Field::Category
            | Field::Tags
            | Field::OriginalFilename
            | Field::RawObjectPath
            | Field::ThumbnailUrl => FieldPolicy::FillIfEmpty,
        }
    }
}

/// Values that have an "unset" state the merge rules can recognise.
pub trait MergeValue {
    fn is_unset(&self) -> bool;
}

impl MergeValue for String {
    fn is_unset(&self) -> bool {
        self.trim().is_empty()
    }
}

impl MergeValue for bool {
    fn is_unset(&self) -> bool {
        !*self
    }
}

impl<T> MergeValue for Vec<T> {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

impl MergeValue for MediaMetadata {
    fn is_unset(&self) -> bool {
        *self == MediaMetadata::default()
    }
}

impl<T: MergeValue> MergeValue for Option<T> {
    fn is_unset(&self) -> bool {
        self.as_ref().map_or(true, MergeValue::is_unset)
    }
}

/// Merges one field. An unset incoming value never changes anything.
///
/// Returns whether `current` was modified.
pub fn merge_field<T>(current: &mut T, incoming: &T, policy: FieldPolicy) -> bool
where
    T: MergeValue + Clone + PartialEq,
{
    merge_field_with(current, incoming, policy, T::is_unset)
}

/// Same as [`merge_field`] with a custom notion of "unset".
pub fn merge_field_with<T, F>(current: &mut T, incoming: &T, policy: FieldPolicy, is_unset: F) -> bool
where
    T: Clone + PartialEq,
    F: Fn(&T) -> bool,
{
    if is_unset(incoming) {
        return false;
    }
    let replace = match policy {
        FieldPolicy::FillIfEmpty | FieldPolicy::EscalateOnly => is_unset(current),
        FieldPolicy::Authoritative => current != incoming,
    };
    if replace {
        *current = incoming.clone();
    }
    replace
}

/// Field values carried by one event, normalized for merging.
///
/// Absent values are represented by their unset form (`None`, `""`, `[]`,
/// `false`) so they never overwrite anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoPatch {
    pub external_id: String,
    pub owner_id: String,
    pub owner_display_name: Option<String>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub is_private: bool,
    pub original_filename: Option<String>,
    pub raw_object_path: Option<String>,
    pub thumbnail_url: Option<String>,
    pub manifest_url: Option<String>,
    pub media: Option<MediaMetadata>,
    pub status: Option<VideoStatus>,
}

impl VideoPatch {
    /// The external id addresses the record; every event must carry one.
    pub fn validate_identity(&self) -> Result<(), AppError> {
        if self.external_id.trim().is_empty() {
            return Err(AppError::InvalidEvent("missing external id".to_string()));
        }
        Ok(())
    }

    /// Registrations must also name the owner. Finalizations may omit it and
    /// leave it to the registration to fill in.
    pub fn require_owner(&self) -> Result<(), AppError> {
        self.validate_identity()?;
        if self.owner_id.trim().is_empty() {
            return Err(AppError::InvalidEvent(format!(
                "missing owner id for {}",
                self.external_id
            )));
        }
        Ok(())
    }

    /// A new record seeded with placeholder values and this patch merged in.
    pub fn seed(&self) -> NewVideo {
        let mut fields = VideoFields::placeholder();
        merge(&mut fields, self);
        NewVideo {
            external_id: self.external_id.trim().to_string(),
            owner_id: self.owner_id.trim().to_string(),
            fields,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl From<&RegisteredEvent> for VideoPatch {
    fn from(event: &RegisteredEvent) -> Self {
        Self {
            external_id: event.external_id.trim().to_string(),
            owner_id: event.owner_id.trim().to_string(),
            owner_display_name: non_blank(&event.owner_display_name),
            title: non_blank(&event.title).unwrap_or_default(),
            description: non_blank(&event.description).unwrap_or_default(),
            category: non_blank(&event.category).unwrap_or_default(),
            tags: event.tags.clone(),
            is_private: event.is_private,
            original_filename: non_blank(&event.original_filename),
            raw_object_path: non_blank(&event.raw_object_path),
            ..Default::default()
        }
    }
}

impl From<&FinalizedEvent> for VideoPatch {
    fn from(event: &FinalizedEvent) -> Self {
        Self {
            external_id: event.external_id.trim().to_string(),
            owner_id: event.owner_id.trim().to_string(),
            owner_display_name: non_blank(&event.owner_display_name),
            title: non_blank(&event.title).unwrap_or_default(),
            description: non_blank(&event.description).unwrap_or_default(),
            category: non_blank(&event.category).unwrap_or_default(),
            tags: event.tags.clone(),
            is_private: event.is_private.unwrap_or(false),
            original_filename: non_blank(&event.original_filename),
            raw_object_path: non_blank(&event.raw_object_path),
            thumbnail_url: non_blank(&event.thumbnail_url),
            manifest_url: event.manifest_url().map(|u| u.trim().to_string()),
            media: event.media_metadata.clone(),
            status: Some(VideoStatus::Ready),
        }
    }
}

/// Folds `patch` into a stored record, owner included. Returns whether
/// anything changed.
pub fn merge_video(video: &mut Video, patch: &VideoPatch) -> bool {
    let owner_filled = merge_field(&mut video.owner_id, &patch.owner_id, Field::OwnerId.policy());
    let fields_changed = merge(&mut video.fields, patch);
    owner_filled || fields_changed
}

/// Folds `patch` into `fields`. Returns whether any field changed.
pub fn merge(fields: &mut VideoFields, patch: &VideoPatch) -> bool {
    let mut changed = false;

    changed |= merge_field(
        &mut fields.owner_display_name,
        &patch.owner_display_name,
        Field::OwnerDisplayName.policy(),
    );
    changed |= merge_field_with(
        &mut fields.title,
        &patch.title,
        Field::Title.policy(),
        is_unset_title,
    );
    changed |= merge_field(
        &mut fields.description,
        &patch.description,
        Field::Description.policy(),
    );
    changed |= merge_field(&mut fields.category, &patch.category, Field::Category.policy());
    changed |= merge_field(&mut fields.tags, &patch.tags, Field::Tags.policy());
    changed |= merge_field(
        &mut fields.original_filename,
        &patch.original_filename,
        Field::OriginalFilename.policy(),
    );
    changed |= merge_field(
        &mut fields.raw_object_path,
        &patch.raw_object_path,
        Field::RawObjectPath.policy(),
    );
    changed |= merge_field(
        &mut fields.thumbnail_url,
        &patch.thumbnail_url,
        Field::ThumbnailUrl.policy(),
    );
    changed |= merge_field(&mut fields.is_private, &patch.is_private, Field::IsPrivate.policy());
    changed |= merge_field(
        &mut fields.manifest_url,
        &patch.manifest_url,
        Field::ManifestUrl.policy(),
    );
    changed |= merge_field(&mut fields.media, &patch.media, Field::MediaMetadata.policy());

    if let Some(next) = patch.status {
        let advanced = fields.status.advance_to(next);
        if advanced != fields.status {
            fields.status = advanced;
            changed = true;
        }
    }

    changed
}
