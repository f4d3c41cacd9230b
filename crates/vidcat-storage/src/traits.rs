//! Storage abstraction trait
//!
//! This module defines the minimal set of remote calls the catalog needs. The
//! resilience policy lives in [`crate::gateway`], not in the backends.

use crate::StorageBackend;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("List failed: {0}")]
    ListFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Circuit breaker open, storage calls suspended")]
    BreakerOpen,

    #[error("Deadline exceeded before storage call completed")]
    DeadlineExceeded,
}

impl StorageError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::DeleteFailed(_)
                | StorageError::ListFailed(_)
                | StorageError::BackendError(_)
                | StorageError::IoError(_)
                | StorageError::Timeout(_)
        )
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One page of keys under a prefix, in lexicographic order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Cursor for the next page; `None` once the listing is exhausted.
    pub next_start_after: Option<String>,
}

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem) implement this trait. A prefix
/// names a folder: listing `hls/a/b` returns `hls/a/b/master.m3u8` but not
/// `hls/a/bc/master.m3u8`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Delete a single object. Deleting an absent object succeeds.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    /// Check if an object exists
    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    /// List up to `max_keys` keys under `prefix` that sort after `start_after`.
    async fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> StorageResult<ListPage>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
