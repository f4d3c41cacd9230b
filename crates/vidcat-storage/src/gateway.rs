//! Resilient storage gateway.
//!
//! [`StorageGateway`] decorates any [`Storage`] backend. Every remote call goes
//! through the same wrapper:
//!
//! 1. the caller's deadline is checked, then the shared [`CircuitBreaker`]
//!    grants or refuses the attempt (refusal fails the call immediately)
//! 2. the attempt runs under `min(attempt_timeout, time left before deadline)`
//! 3. transient failures are retried with exponential backoff up to
//!    `max_retries` times; each retry passes through the breaker again
//!
//! Prefix deletion pages through the listing and deletes object by object,
//! recording individual failures and carrying on.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use vidcat_core::GatewayConfig;

use crate::breaker::CircuitBreaker;
use crate::retry::RetryPolicy;
use crate::traits::{ListPage, Storage, StorageError, StorageResult};
use crate::StorageBackend;

/// An object that could not be removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectFailure {
    pub key: String,
    pub error: String,
}

/// Outcome of purging one prefix.
#[derive(Debug)]
pub struct PrefixPurge {
    pub prefix: String,
    pub deleted: usize,
    pub failures: Vec<ObjectFailure>,
    /// Set when the purge stopped before the listing was exhausted.
    pub interrupted: Option<StorageError>,
}

impl PrefixPurge {
    fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            deleted: 0,
            failures: Vec::new(),
            interrupted: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.interrupted.is_none()
    }

    pub fn hit_deadline(&self) -> bool {
        matches!(self.interrupted, Some(StorageError::DeadlineExceeded))
    }
}

#[derive(Clone)]
pub struct StorageGateway {
    inner: Arc<dyn Storage>,
    breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
    page_size: usize,
}

impl StorageGateway {
    pub fn new(inner: Arc<dyn Storage>, config: &GatewayConfig) -> Self {
        Self {
            inner,
            breaker: Arc::new(CircuitBreaker::new(
                config.breaker_failure_threshold,
                config.breaker_cooldown,
            )),
            policy: RetryPolicy::from_config(config),
            page_size: config.list_page_size.max(1),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }

    #[tracing::instrument(skip(self), fields(storage.backend = %self.backend_type()))]
    pub async fn delete_object(&self, key: &str, deadline: Instant) -> StorageResult<()> {
        self.call("delete", key, deadline, || self.inner.delete(key))
            .await
    }

    pub async fn object_exists(&self, key: &str, deadline: Instant) -> StorageResult<bool> {
        self.call("exists", key, deadline, || self.inner.exists(key))
            .await
    }

    pub async fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        deadline: Instant,
    ) -> StorageResult<ListPage> {
        self.call("list", prefix, deadline, || {
            self.inner.list_page(prefix, start_after, self.page_size)
        })
        .await
    }

    /// Deletes `key` if it exists. Returns `false` when it was already absent.
    pub async fn delete_if_exists(&self, key: &str, deadline: Instant) -> StorageResult<bool> {
        if !self.object_exists(key, deadline).await? {
            tracing::debug!(key = %key, "Object already absent, skipping delete");
            return Ok(false);
        }
        self.delete_object(key, deadline).await?;
        Ok(true)
    }

    /// Deletes every object under `prefix`.
    ///
    /// A failed object delete is recorded and skipped. A failed page listing or
    /// an expired deadline stops the purge and is reported in `interrupted`.
    #[tracing::instrument(skip(self), fields(storage.backend = %self.backend_type()))]
    pub async fn delete_prefix(&self, prefix: &str, deadline: Instant) -> PrefixPurge {
        let start = std::time::Instant::now();
        let mut purge = PrefixPurge::new(prefix);
        let mut cursor: Option<String> = None;

        'pages: loop {
            let page = match self.list_page(prefix, cursor.as_deref(), deadline).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(prefix = %prefix, error = %e, "Listing prefix failed");
                    purge.interrupted = Some(e);
                    break;
                }
            };

            for key in &page.keys {
                match self.delete_object(key, deadline).await {
                    Ok(()) => purge.deleted += 1,
                    Err(StorageError::DeadlineExceeded) => {
                        purge.interrupted = Some(StorageError::DeadlineExceeded);
                        break 'pages;
                    }
                    Err(e) => {
                        tracing::error!(key = %key, error = %e, "Deleting object under prefix failed");
                        purge.failures.push(ObjectFailure {
                            key: key.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }

            match page.next_start_after {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::info!(
            prefix = %prefix,
            deleted = purge.deleted,
            failed = purge.failures.len(),
            interrupted = purge.interrupted.is_some(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Prefix purge finished"
        );

        purge
    }

    async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        target: &str,
        deadline: Instant,
        attempt: F,
    ) -> StorageResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut retry = 0;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(StorageError::DeadlineExceeded);
            }

            let permit = self.breaker.try_acquire()?;

            let remaining = deadline - now;
            let budget = self.policy.attempt_timeout.min(remaining);
            let outcome = match tokio::time::timeout(budget, attempt()).await {
                Ok(result) => result,
                Err(_) if budget < self.policy.attempt_timeout => {
                    permit.release();
                    return Err(StorageError::DeadlineExceeded);
                }
                Err(_) => Err(StorageError::Timeout(budget)),
            };

            let error = match outcome {
                Ok(value) => {
                    permit.success();
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    permit.success();
                    return Err(e);
                }
                Err(e) => {
                    permit.failure();
                    e
                }
            };

            if retry >= self.policy.max_retries {
                tracing::warn!(
                    operation,
                    target = %target,
                    attempts = retry + 1,
                    error = %error,
                    "Storage call failed after retries"
                );
                return Err(error);
            }

            let delay = self.policy.backoff(retry);
            // The deadline itself has not passed; report what actually failed.
            if Instant::now() + delay >= deadline {
                tracing::warn!(
                    operation,
                    target = %target,
                    attempts = retry + 1,
                    error = %error,
                    "No time left to retry storage call"
                );
                return Err(error);
            }

            tracing::debug!(
                operation,
                target = %target,
                retry = retry + 1,
                backoff_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying storage call"
            );
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerStatus;
    use crate::memory::{InMemoryStorage, StorageCall};
    use std::time::Duration;

    fn gateway(storage: Arc<InMemoryStorage>, config: GatewayConfig) -> StorageGateway {
        StorageGateway::new(storage, &config)
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_surfaces_transient_error() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.fail_key("a");
        let gw = gateway(storage.clone(), GatewayConfig::default());

        let result = gw.delete_object("a", far_deadline()).await;
        assert!(matches!(result, Err(StorageError::BackendError(_))));
        // first attempt plus two retries
        assert_eq!(storage.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_past_deadline_surfaces_last_error() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.fail_key("a");
        let gw = gateway(storage.clone(), GatewayConfig::default());

        let deadline = Instant::now() + Duration::from_millis(100);
        let result = gw.delete_object("a", deadline).await;
        assert!(matches!(result, Err(StorageError::BackendError(_))));
        assert_eq!(storage.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_timeout_counts_as_transient() {
        let storage = Arc::new(InMemoryStorage::with_objects(["a"]));
        storage.set_latency(Some(Duration::from_secs(5)));
        let config = GatewayConfig {
            max_retries: 0,
            ..GatewayConfig::default()
        };
        let gw = gateway(storage.clone(), config);

        let result = gw.object_exists("a", far_deadline()).await;
        assert!(matches!(result, Err(StorageError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_fails_fast_without_calling_backend() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.set_unavailable(true);
        let config = GatewayConfig {
            breaker_failure_threshold: 2,
            max_retries: 5,
            ..GatewayConfig::default()
        };
        let gw = gateway(storage.clone(), config);

        let result = gw.delete_object("a", far_deadline()).await;
        assert!(matches!(result, Err(StorageError::BreakerOpen)));
        // breaker opened on the second failure; remaining retries never reached the backend
        assert_eq!(storage.call_count(), 2);
        assert_eq!(gw.breaker().status(), BreakerStatus::Open);

        storage.clear_calls();
        let result = gw.object_exists("b", far_deadline()).await;
        assert!(matches!(result, Err(StorageError::BreakerOpen)));
        assert_eq!(storage.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_probes_after_cooldown() {
        let storage = Arc::new(InMemoryStorage::with_objects(["a"]));
        storage.set_unavailable(true);
        let config = GatewayConfig {
            breaker_failure_threshold: 1,
            max_retries: 0,
            ..GatewayConfig::default()
        };
        let gw = gateway(storage.clone(), config);

        assert!(gw.object_exists("a", far_deadline()).await.is_err());
        assert_eq!(gw.breaker().status(), BreakerStatus::Open);

        storage.set_unavailable(false);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(gw.object_exists("a", far_deadline()).await.unwrap());
        assert_eq!(gw.breaker().status(), BreakerStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_skips_backend() {
        let storage = Arc::new(InMemoryStorage::with_objects(["a"]));
        let gw = gateway(storage.clone(), GatewayConfig::default());

        let result = gw.delete_object("a", Instant::now()).await;
        assert!(matches!(result, Err(StorageError::DeadlineExceeded)));
        assert_eq!(storage.call_count(), 0);
        assert!(storage.contains("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_slow_attempt() {
        let storage = Arc::new(InMemoryStorage::with_objects(["a"]));
        storage.set_latency(Some(Duration::from_secs(2)));
        let gw = gateway(storage.clone(), GatewayConfig::default());

        let deadline = Instant::now() + Duration::from_millis(500);
        let result = gw.delete_object("a", deadline).await;
        assert!(matches!(result, Err(StorageError::DeadlineExceeded)));
        // a deadline cut is not the backend's fault
        assert_eq!(gw.breaker().status(), BreakerStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_if_exists_skips_absent_objects() {
        let storage = Arc::new(InMemoryStorage::with_objects(["present"]));
        let gw = gateway(storage.clone(), GatewayConfig::default());

        assert!(gw.delete_if_exists("present", far_deadline()).await.unwrap());
        assert!(!gw.delete_if_exists("absent", far_deadline()).await.unwrap());
        assert_eq!(
            storage.calls(),
            vec![
                StorageCall::Exists("present".to_string()),
                StorageCall::Delete("present".to_string()),
                StorageCall::Exists("absent".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn purges_prefix_across_pages_and_continues_past_failures() {
        let storage = Arc::new(InMemoryStorage::with_objects([
            "hls/o/a/1.ts",
            "hls/o/a/2.ts",
            "hls/o/a/3.ts",
            "hls/o/a/master.m3u8",
            "hls/o/b/keep.ts",
        ]));
        storage.fail_key("hls/o/a/2.ts");
        let config = GatewayConfig {
            list_page_size: 2,
            max_retries: 0,
            breaker_failure_threshold: 10,
            ..GatewayConfig::default()
        };
        let gw = gateway(storage.clone(), config);

        let purge = gw.delete_prefix("hls/o/a", far_deadline()).await;
        assert_eq!(purge.deleted, 3);
        assert_eq!(purge.failures.len(), 1);
        assert_eq!(purge.failures[0].key, "hls/o/a/2.ts");
        assert!(purge.interrupted.is_none());
        assert!(!purge.is_complete());
        assert_eq!(storage.keys(), vec!["hls/o/a/2.ts", "hls/o/b/keep.ts"]);
    }

    #[tokio::test(start_paused = true)]
    async fn listing_failure_interrupts_purge() {
        let storage = Arc::new(InMemoryStorage::with_objects(["videos/o/a/x"]));
        storage.fail_key("videos/o/a");
        let gw = gateway(storage.clone(), GatewayConfig::default());

        let purge = gw.delete_prefix("videos/o/a", far_deadline()).await;
        assert_eq!(purge.deleted, 0);
        assert!(matches!(
            purge.interrupted,
            Some(StorageError::BackendError(_))
        ));
        assert!(storage.contains("videos/o/a/x"));
    }
}
