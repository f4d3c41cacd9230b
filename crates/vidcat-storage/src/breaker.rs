//! Circuit breaker shared by every call a gateway makes.
//!
//! Closed: calls pass, consecutive failures are counted. After
//! `failure_threshold` failures in a row the breaker opens and rejects calls
//! without touching the network until `cooldown` has elapsed. The first call
//! after that is let through as a probe (half-open); its outcome closes or
//! re-opens the breaker. Other calls fail fast while the probe is in flight.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::traits::{StorageError, StorageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStatus {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen { probe_in_flight: bool },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> BreakerStatus {
        match *self.lock() {
            BreakerState::Closed { .. } => BreakerStatus::Closed,
            BreakerState::Open { until } if Instant::now() >= until => BreakerStatus::HalfOpen,
            BreakerState::Open { .. } => BreakerStatus::Open,
            BreakerState::HalfOpen { .. } => BreakerStatus::HalfOpen,
        }
    }

    /// Asks permission for one call.
    ///
    /// The returned permit must be resolved with [`BreakerPermit::success`] or
    /// [`BreakerPermit::failure`]; dropping it unresolved releases a half-open
    /// probe slot by re-opening the breaker.
    pub fn try_acquire(&self) -> StorageResult<BreakerPermit<'_>> {
        let mut state = self.lock();
        let probe = match *state {
            BreakerState::Closed { .. } => false,
            BreakerState::Open { until } => {
                if Instant::now() < until {
                    return Err(StorageError::BreakerOpen);
                }
                tracing::info!("Storage circuit breaker half-open, probing");
                *state = BreakerState::HalfOpen {
                    probe_in_flight: true,
                };
                true
            }
            BreakerState::HalfOpen {
                probe_in_flight: true,
            } => return Err(StorageError::BreakerOpen),
            BreakerState::HalfOpen {
                probe_in_flight: false,
            } => {
                *state = BreakerState::HalfOpen {
                    probe_in_flight: true,
                };
                true
            }
        };
        Ok(BreakerPermit {
            breaker: self,
            probe,
            resolved: false,
        })
    }

    fn on_success(&self) {
        let mut state = self.lock();
        if !matches!(*state, BreakerState::Closed { .. }) {
            tracing::info!("Storage circuit breaker closed");
        }
        *state = BreakerState::Closed {
            consecutive_failures: 0,
        };
    }

    fn on_failure(&self) {
        let mut state = self.lock();
        let next = match *state {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.failure_threshold {
                    tracing::warn!(
                        consecutive_failures = failures,
                        cooldown_ms = self.cooldown.as_millis() as u64,
                        "Storage circuit breaker opened"
                    );
                    BreakerState::Open {
                        until: Instant::now() + self.cooldown,
                    }
                } else {
                    BreakerState::Closed {
                        consecutive_failures: failures,
                    }
                }
            }
            BreakerState::HalfOpen { .. } => {
                tracing::warn!(
                    cooldown_ms = self.cooldown.as_millis() as u64,
                    "Storage circuit breaker probe failed, re-opened"
                );
                BreakerState::Open {
                    until: Instant::now() + self.cooldown,
                }
            }
            BreakerState::Open { until } => BreakerState::Open { until },
        };
        *state = next;
    }

    fn on_abandoned_probe(&self) {
        let mut state = self.lock();
        if matches!(*state, BreakerState::HalfOpen { .. }) {
            *state = BreakerState::Open {
                until: Instant::now() + self.cooldown,
            };
        }
    }
}

/// Permission for a single call through the breaker.
#[must_use]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    resolved: bool,
}

impl BreakerPermit<'_> {
    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.on_success();
    }

    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.on_failure();
    }

    /// Gives the permit back without counting an outcome.
    pub fn release(self) {}
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved && self.probe {
            self.breaker.on_abandoned_probe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fail(breaker: &CircuitBreaker) {
        breaker.try_acquire().unwrap().failure();
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(10));
        fail(&breaker);
        fail(&breaker);
        assert_eq!(breaker.status(), BreakerStatus::Closed);
        fail(&breaker);
        assert_eq!(breaker.status(), BreakerStatus::Open);
        assert!(matches!(
            breaker.try_acquire(),
            Err(StorageError::BreakerOpen)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(10));
        fail(&breaker);
        fail(&breaker);
        breaker.try_acquire().unwrap().success();
        fail(&breaker);
        fail(&breaker);
        assert_eq!(breaker.status(), BreakerStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_probe_closes_on_success() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        fail(&breaker);
        tokio::time::advance(Duration::from_secs(10)).await;

        let probe = breaker.try_acquire().unwrap();
        // only one probe at a time
        assert!(matches!(
            breaker.try_acquire(),
            Err(StorageError::BreakerOpen)
        ));
        probe.success();
        assert_eq!(breaker.status(), BreakerStatus::Closed);
        assert!(breaker.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_probe_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        fail(&breaker);
        tokio::time::advance(Duration::from_secs(11)).await;
        fail(&breaker);
        assert_eq!(breaker.status(), BreakerStatus::Open);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(breaker.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_probe_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        fail(&breaker);
        tokio::time::advance(Duration::from_secs(10)).await;
        drop(breaker.try_acquire().unwrap());
        assert_eq!(breaker.status(), BreakerStatus::Open);
    }
}
