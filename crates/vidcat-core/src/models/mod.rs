pub mod events;
pub mod video;

pub use events::{deserialize_tags, normalize_tags, FinalizedEvent, HlsRendition, RegisteredEvent};
pub use video::{is_unset_title, MediaMetadata, NewVideo, Video, VideoFields, VideoStatus};
