//! Exponential backoff retry with full jitter.
//!
//! The sleep sequence is `d_i = min(max_delay, base_delay * exponential_base^i)`,
//! with the actual sleep uniform on `[0, d_i]` when jitter is enabled. This is
//! full jitter, not the half-jitter (`[0.5*d_i, d_i]`) the original
//! `RetryWithBackoff.execute` used — see decision 1 in `DESIGN.md`.

use std::time::Duration;

use rand::Rng;

/// Configuration for [`retry`].
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Number of retries after the first attempt (total attempts = `max_retries + 1`).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Multiplier applied to the delay on each subsequent attempt.
    pub exponential_base: f64,
    /// Whether to jitter the computed delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// The un-jittered delay before attempt `attempt` (0-indexed retry count).
    #[must_use]
    #[expect(
        clippy::float_arithmetic,
        reason = "exponential backoff is inherently a floating-point computation; the result is clamped to max_delay before use"
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scale = self.exponential_base.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let base_secs = self.base_delay.as_secs_f64();
        let computed = base_secs * scale;
        let capped = computed.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    fn jittered_delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let bound = self.delay_for_attempt(attempt);
        if self.jitter {
            let secs = rng.gen_range(0.0..=bound.as_secs_f64().max(f64::EPSILON));
            Duration::from_secs_f64(secs)
        } else {
            bound
        }
    }
}

/// Run `operation`, retrying on errors for which `is_retryable` returns
/// `true`, sleeping the jittered backoff delay between attempts. On the
/// final attempt (or on a non-retryable error) the error is returned as-is.
pub async fn retry<T, E, F, Fut>(
    config: &RetryConfig,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut rng = rand::thread_rng();
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.max_retries || !is_retryable(&err) {
                    return Err(err);
                }
                let delay = config.jittered_delay(attempt, &mut rng);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
