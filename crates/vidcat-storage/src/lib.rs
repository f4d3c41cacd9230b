//! Vidcat Storage Library
//!
//! This crate provides the [`Storage`] trait with S3 and local filesystem
//! backends, and the [`StorageGateway`] that wraps any backend with per-attempt
//! timeouts, bounded retries with exponential backoff and a shared circuit
//! breaker.
//!
//! # Storage key layout
//!
//! Objects owned by a catalog record are addressed from the owner id and the
//! external asset id:
//!
//! - **Thumbnail**: `thumbnails/{owner_id}/{external_id}.jpg`
//! - **Renditions**: `hls/{owner_id}/{external_id}/...`
//! - **Other derived objects**: `videos/{owner_id}/{external_id}/...`
//!
//! Keys must not contain `..` or a leading `/`. Key derivation is centralized in
//! the `keys` module so all backends and the deletion planner agree.

pub mod breaker;
pub mod factory;
pub mod gateway;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(any(test, feature = "storage-memory"))]
pub mod memory;
pub mod retry;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use breaker::{BreakerStatus, CircuitBreaker};
pub use factory::create_storage;
pub use gateway::{ObjectFailure, PrefixPurge, StorageGateway};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(any(test, feature = "storage-memory"))]
pub use memory::{InMemoryStorage, StorageCall};
pub use retry::RetryPolicy;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ListPage, Storage, StorageError, StorageResult};
pub use vidcat_core::StorageBackend;
