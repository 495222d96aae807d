//! Cancellable timeout wrapper.
//!
//! Built directly on `tokio::time::timeout`: the wrapped future is dropped
//! (and so cancelled cooperatively, per the concurrency model) the instant
//! the deadline fires.

use std::time::Duration;

use thiserror::Error;

/// Error returned when an operation exceeds its deadline.
#[derive(Debug, Error, Clone, Copy)]
#[error("operation in '{scope}' timed out after {duration:?}")]
pub struct TimeoutError {
    /// Name of the scope the deadline applied to, for logs/metrics.
    pub scope: &'static str,
    /// The deadline that was exceeded.
    pub duration: Duration,
}

/// Run `fut` under a deadline of `duration`. Returns [`TimeoutError`] if the
/// deadline elapses first.
pub async fn with_timeout<T>(
    scope: &'static str,
    duration: Duration,
    fut: impl std::future::Future<Output = T>,
) -> Result<T, TimeoutError> {
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_elapsed| TimeoutError { scope, duration })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_the_value_when_it_completes_in_time() {
        let result = with_timeout("test", Duration::from_secs(1), async { 7 }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn times_out_when_the_future_is_slower_than_the_deadline() {
        let result = with_timeout("test", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            7
        })
        .await;
        assert!(result.is_err());
    }
}
