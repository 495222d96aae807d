//! Three-state circuit breaker.
//!
//! Mirrors the state machine in the original `CircuitBreaker` class: the
//! mutex guards only the tiny state transition, never the wrapped call
//! itself, so a slow call cannot block other callers from observing or
//! tripping the breaker.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Current state of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    /// Calls pass through normally.
    Closed,
    /// Calls are rejected without being attempted.
    Open,
    /// A single probe call is allowed through to test recovery.
    HalfOpen,
}

/// Runtime counters for a [`CircuitBreaker`], exposed via `get_metrics`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CircuitBreakerMetrics {
    /// Total calls attempted (including fast-failed ones).
    pub total_calls: u64,
    /// Calls that completed successfully.
    pub successful_calls: u64,
    /// Calls that failed in a way the breaker counts.
    pub failed_calls: u64,
    /// Consecutive failures since the last success.
    pub consecutive_failures: u32,
    /// Number of state transitions observed.
    pub state_changes: u64,
}

/// Error returned when the breaker refuses a call.
#[derive(Debug, Error)]
#[error("circuit breaker '{name}' is open")]
pub struct CircuitBreakerError {
    /// Name of the breaker that refused the call.
    pub name: String,
}

struct Inner {
    state: CircuitBreakerState,
    consecutive_failures: u32,
    last_failure_time: Option<Instant>,
    metrics: CircuitBreakerMetrics,
}

/// Configuration for a [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Breaker name, used in errors and metric labels.
    pub name: String,
    /// Consecutive failures required to trip the breaker open.
    pub failure_threshold: u32,
    /// Time the breaker stays open before allowing a half-open probe.
    pub recovery_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Construct a config with the given name and thresholds.
    #[must_use]
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            recovery_timeout,
        }
    }
}

/// A three-state circuit breaker: CLOSED -> OPEN -> HALF_OPEN -> CLOSED|OPEN.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

/// Outcome of asking the breaker for permission to call.
enum Permit {
    Allowed { was_half_open: bool },
    Denied,
}

impl CircuitBreaker {
    /// Construct a new breaker, starting CLOSED.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitBreakerState::Closed,
                consecutive_failures: 0,
                last_failure_time: None,
                metrics: CircuitBreakerMetrics::default(),
            }),
        }
    }

    /// Breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current state. Locks only momentarily.
    #[must_use]
    pub fn state(&self) -> CircuitBreakerState {
        self.lock().state
    }

    /// Snapshot of the current metrics.
    #[must_use]
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.lock().metrics
    }

    #[expect(clippy::unwrap_used, reason = "poisoning would indicate a panic elsewhere in this process; recovering the lock is safer than propagating a second panic")]
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn acquire(&self) -> Permit {
        let mut inner = self.lock();
        inner.metrics.total_calls += 1;
        match inner.state {
            CircuitBreakerState::Closed | CircuitBreakerState::HalfOpen => Permit::Allowed {
                was_half_open: inner.state == CircuitBreakerState::HalfOpen,
            },
            CircuitBreakerState::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.recovery_timeout {
                    inner.state = CircuitBreakerState::HalfOpen;
                    inner.metrics.state_changes += 1;
                    Permit::Allowed {
                        was_half_open: true,
                    }
                } else {
                    Permit::Denied
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        inner.metrics.successful_calls += 1;
        inner.consecutive_failures = 0;
        if inner.state == CircuitBreakerState::HalfOpen {
            inner.state = CircuitBreakerState::Closed;
            inner.metrics.state_changes += 1;
        }
    }

    fn record_failure(&self) {
        let mut inner = self.lock();
        inner.metrics.failed_calls += 1;
        inner.consecutive_failures += 1;
        inner.metrics.consecutive_failures = inner.consecutive_failures;
        inner.last_failure_time = Some(Instant::now());
        if inner.state == CircuitBreakerState::HalfOpen {
            inner.state = CircuitBreakerState::Open;
            inner.metrics.state_changes += 1;
        } else if inner.consecutive_failures >= self.config.failure_threshold
            && inner.state != CircuitBreakerState::Open
        {
            inner.state = CircuitBreakerState::Open;
            inner.metrics.state_changes += 1;
        }
    }

    /// Run `fn_` under the breaker. `is_expected` classifies which `Err`
    /// values count against the breaker; failures it returns `false` for
    /// are rethrown without mutating breaker state (§4.1 step 7).
    pub async fn call<T, E, F, Fut>(
        &self,
        is_expected: impl Fn(&E) -> bool,
        fn_: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        match self.acquire() {
            Permit::Denied => Err(CallError::CircuitOpen(CircuitBreakerError {
                name: self.config.name.clone(),
            })),
            Permit::Allowed { .. } => match fn_().await {
                Ok(value) => {
                    self.record_success();
                    Ok(value)
                }
                Err(err) => {
                    if is_expected(&err) {
                        self.record_failure();
                    }
                    Err(CallError::Inner(err))
                }
            },
        }
    }
}

/// Error returned by [`CircuitBreaker::call`]: either the breaker refused
/// the call, or the wrapped function failed.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The breaker is open and refused the call.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitBreakerError),
    /// The wrapped function returned an error.
    #[error(transparent)]
    Inner(E),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig::new("test", threshold, recovery))
    }

    #[tokio::test]
    async fn trips_open_after_threshold_consecutive_failures() {
        let cb = breaker(2, Duration::from_secs(60));
        for _ in 0..2 {
            let _ = cb
                .call(|_: &()| true, || async { Err::<(), ()>(()) })
                .await;
        }
        assert_eq!(cb.state(), CircuitBreakerState::Open);
        assert_eq!(cb.metrics().consecutive_failures, 2);
    }

    #[tokio::test]
    async fn open_breaker_fails_fast_without_invoking_the_function() {
        let cb = breaker(1, Duration::from_secs(60));
        let _ = cb.call(|_: &()| true, || async { Err(()) }).await;
        assert_eq!(cb.state(), CircuitBreakerState::Open);

        let mut invoked = false;
        let result = cb
            .call(|_: &()| true, || {
                invoked = true;
                async { Ok::<(), ()>(()) }
            })
            .await;
        assert!(matches!(result, Err(CallError::CircuitOpen(_))));
        assert!(!invoked);
    }

    #[tokio::test]
    async fn half_open_success_closes_the_breaker() {
        let cb = breaker(1, Duration::from_millis(1));
        let _ = cb.call(|_: &()| true, || async { Err(()) }).await;
        assert_eq!(cb.state(), CircuitBreakerState::Open);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let result = cb.call(|_: &()| true, || async { Ok::<(), ()>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
        assert_eq!(cb.metrics().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_the_breaker() {
        let cb = breaker(1, Duration::from_millis(1));
        let _ = cb.call(|_: &()| true, || async { Err(()) }).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let _ = cb.call(|_: &()| true, || async { Err(()) }).await;
        assert_eq!(cb.state(), CircuitBreakerState::Open);
    }

    #[tokio::test]
    async fn unexpected_failure_does_not_mutate_breaker_state() {
        let cb = breaker(1, Duration::from_secs(60));
        let result = cb.call(|_: &()| false, || async { Err(()) }).await;
        assert!(matches!(result, Err(CallError::Inner(()))));
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
        assert_eq!(cb.metrics().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failures() {
        let cb = breaker(3, Duration::from_secs(60));
        let _ = cb.call(|_: &()| true, || async { Err(()) }).await;
        let _ = cb
            .call(|_: &()| true, || async { Ok::<(), ()>(()) })
            .await;
        assert_eq!(cb.metrics().consecutive_failures, 0);
        assert_eq!(cb.state(), CircuitBreakerState::Closed);
    }
}
