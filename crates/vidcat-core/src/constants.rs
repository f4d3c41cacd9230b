/// Title given to a record until an event supplies a real one.
pub const PLACEHOLDER_TITLE: &str = "Untitled Video";

/// Separator used when tags arrive as a single string.
pub const TAG_SEPARATOR: char = ',';
