//! Resilience primitives: circuit breaker, retry-with-backoff, timeout, and
//! their composition.
//!
//! The composition order is fixed: `breaker ∘ retry ∘ timeout ∘ operation`.
//! Timeout is innermost so every attempt gets its own deadline; retry sits
//! above timeout so a timed-out attempt is itself retryable; the breaker is
//! outermost so the whole retry budget counts as one call against it.
//! Reversing this order changes semantics — see §4.1 of `SPEC_FULL.md`.

mod circuit_breaker;
mod registry;
mod retry;
mod timeout;

pub use circuit_breaker::{
    CallError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerMetrics,
    CircuitBreakerState,
};
pub use registry::{CircuitBreakerRegistry, HTTP_SERVICE, LLM_PRIMARY, TWS_API};
pub use retry::{retry, RetryConfig};
pub use timeout::{with_timeout, TimeoutError};

use std::time::Duration;

use thiserror::Error;

/// Error produced by [`protected_call`], unifying the breaker, retry, and
/// timeout layers into a single type callers can match on.
#[derive(Debug, Error)]
pub enum ProtectedCallError<E> {
    /// The circuit breaker refused the call.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitBreakerError),
    /// Every attempt timed out, or the final attempt did.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    /// The wrapped operation failed in a way the caller's classifier
    /// recognised as non-retryable, or retries were exhausted.
    #[error(transparent)]
    Inner(E),
}

/// Run `operation` through timeout, then retry, then the circuit breaker,
/// in that nesting order. `classify` maps the operation's error type to
/// whether it should count as a breaker failure and be retried.
pub async fn protected_call<T, E, F, Fut>(
    breaker: &CircuitBreaker,
    retry_config: &RetryConfig,
    timeout_scope: &'static str,
    timeout_duration: Duration,
    is_retryable: impl Fn(&E) -> bool,
    is_breaker_failure: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, ProtectedCallError<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    enum Attempt<E> {
        TimedOut,
        Failed(E),
    }

    let breaker_is_expected = |attempt: &Attempt<E>| match attempt {
        Attempt::TimedOut => true,
        Attempt::Failed(err) => is_breaker_failure(err),
    };

    let result = breaker
        .call(breaker_is_expected, || async {
            retry(
                retry_config,
                |attempt: &Attempt<E>| match attempt {
                    Attempt::TimedOut => true,
                    Attempt::Failed(err) => is_retryable(err),
                },
                || async {
                    match with_timeout(timeout_scope, timeout_duration, operation()).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(err)) => Err(Attempt::Failed(err)),
                        Err(_elapsed) => Err(Attempt::TimedOut),
                    }
                },
            )
            .await
        })
        .await;

    match result {
        Ok(value) => Ok(value),
        Err(CallError::CircuitOpen(err)) => Err(ProtectedCallError::CircuitOpen(err)),
        Err(CallError::Inner(Attempt::TimedOut)) => Err(ProtectedCallError::Timeout(TimeoutError {
            scope: timeout_scope,
            duration: timeout_duration,
        })),
        Err(CallError::Inner(Attempt::Failed(err))) => Err(ProtectedCallError::Inner(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn succeeds_when_the_operation_succeeds_first_try() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::new(
            "t",
            5,
            Duration::from_secs(60),
        ));
        let retry_config = RetryConfig {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            exponential_base: 2.0,
            jitter: false,
        };
        let result = protected_call(
            &breaker,
            &retry_config,
            "test",
            Duration::from_secs(1),
            |_: &()| true,
            |_: &()| true,
            || async { Ok::<u32, ()>(1) },
        )
        .await;
        assert!(matches!(result, Ok(1)));
    }

    #[tokio::test]
    async fn timeout_is_retried_then_surfaced_as_timeout_error() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::new(
            "t",
            5,
            Duration::from_secs(60),
        ));
        let retry_config = RetryConfig {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            exponential_base: 2.0,
            jitter: false,
        };
        let attempts = Cell::new(0);
        let result: Result<u32, ProtectedCallError<()>> = protected_call(
            &breaker,
            &retry_config,
            "test",
            Duration::from_millis(1),
            |_: &()| true,
            |_: &()| true,
            || {
                attempts.set(attempts.get() + 1);
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(1)
                }
            },
        )
        .await;
        assert!(matches!(result, Err(ProtectedCallError::Timeout(_))));
        assert_eq!(attempts.get(), 2);
    }

    #[tokio::test]
    async fn repeated_failures_trip_the_breaker_for_subsequent_calls() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig::new(
            "t",
            1,
            Duration::from_secs(60),
        ));
        let retry_config = RetryConfig {
            max_retries: 0,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            exponential_base: 1.0,
            jitter: false,
        };
        let first: Result<u32, ProtectedCallError<&'static str>> = protected_call(
            &breaker,
            &retry_config,
            "test",
            Duration::from_secs(1),
            |_| true,
            |_| true,
            || async { Err("boom") },
        )
        .await;
        assert!(matches!(first, Err(ProtectedCallError::Inner("boom"))));

        let second: Result<u32, ProtectedCallError<&'static str>> = protected_call(
            &breaker,
            &retry_config,
            "test",
            Duration::from_secs(1),
            |_| true,
            |_| true,
            || async { Ok(1) },
        )
        .await;
        assert!(matches!(second, Err(ProtectedCallError::CircuitOpen(_))));
    }
}
