//! In-process storage backend with fault injection.
//!
//! Keys live in a sorted set. Individual keys can be made to fail, the whole
//! backend can be made unavailable, and every call is recorded so tests can
//! assert exactly which remote operations a component performed.

use crate::traits::{ListPage, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    Delete(String),
    Exists(String),
    List(String),
}

#[derive(Default)]
struct Inner {
    objects: BTreeSet<String>,
    failing_keys: HashSet<String>,
    unavailable: bool,
    latency: Option<Duration>,
    calls: Vec<StorageCall>,
}

#[derive(Default)]
pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let storage = Self::new();
        for key in keys {
            storage.insert(key);
        }
        storage
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, key: impl Into<String>) {
        self.lock().objects.insert(key.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().objects.contains(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.iter().cloned().collect()
    }

    /// Every delete or existence check of `key` fails with a backend error.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.lock().failing_keys.insert(key.into());
    }

    /// Every call fails with a backend error while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Delay applied before every call completes.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    pub fn calls(&self) -> Vec<StorageCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Records the call and returns the configured latency, or the injected failure.
    fn begin(&self, call: StorageCall, key: &str) -> StorageResult<Option<Duration>> {
        let mut inner = self.lock();
        inner.calls.push(call);
        if inner.unavailable {
            return Err(StorageError::BackendError(
                "storage backend unavailable".to_string(),
            ));
        }
        if inner.failing_keys.contains(key) {
            return Err(StorageError::BackendError(format!(
                "injected failure for {}",
                key
            )));
        }
        Ok(inner.latency)
    }

    async fn wait(latency: Option<Duration>) {
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let latency = self.begin(StorageCall::Delete(storage_key.to_string()), storage_key)?;
        Self::wait(latency).await;
        self.lock().objects.remove(storage_key);
        Ok(())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let latency = self.begin(StorageCall::Exists(storage_key.to_string()), storage_key)?;
        Self::wait(latency).await;
        Ok(self.contains(storage_key))
    }

    async fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        max_keys: usize,
    ) -> StorageResult<ListPage> {
        let latency = self.begin(StorageCall::List(prefix.to_string()), prefix)?;
        Self::wait(latency).await;

        let folder = format!("{}/", prefix.trim_end_matches('/'));
        let keys: Vec<String> = self
            .lock()
            .objects
            .iter()
            .filter(|k| k.starts_with(&folder))
            .filter(|k| start_after.map_or(true, |after| k.as_str() > after))
            .take(max_keys)
            .cloned()
            .collect();

        let next_start_after = if keys.len() == max_keys {
            keys.last().cloned()
        } else {
            None
        };

        Ok(ListPage {
            keys,
            next_start_after,
        })
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
