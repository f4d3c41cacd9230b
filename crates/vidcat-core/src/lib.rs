//! Vidcat Core Library
//!
//! This crate provides the domain models, event payloads, field merge rules,
//! configuration and error types shared across all vidcat components.

pub mod config;
pub mod constants;
pub mod error;
pub mod merge;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{
    ChannelBackend, ChannelConfig, Config, DeletionConfig, GatewayConfig, StorageConfig,
};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use merge::{merge, merge_video, FieldPolicy, MergeValue, VideoPatch};
pub use storage_types::StorageBackend;
