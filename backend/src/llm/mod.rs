//! LLM fallback service (C5): an ordered provider chain composed over the
//! `resilience` primitives, with typed error classification and metrics.
//!
//! Each attempt is wrapped `breaker ∘ retry ∘ timeout`, exactly like any
//! other call protected by [`crate::resilience::protected_call`] — this
//! service supplies the provider-specific classifier and chain-walking
//! policy on top.

mod error;
mod provider;

pub use error::{AttemptRecord, ErrorClass, LlmError, ProviderError};
pub use provider::{LlmChunkStream, LlmProviderClient, LlmRequest, LlmResponse, ProviderConfig};

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{BoxStream, StreamExt};

use crate::metrics::Metrics;
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, ProtectedCallError, RetryConfig, protected_call,
};

/// Configuration for the whole fallback chain.
pub struct LlmFallbackConfig {
    /// The primary provider, always attempted first.
    pub primary: ProviderConfig,
    /// Providers attempted in order after the primary fails.
    pub fallback_chain: Vec<ProviderConfig>,
    /// Timeout used when a provider entry has none of its own.
    pub default_timeout: Duration,
    /// Retries attempted against a single provider before moving to the
    /// next one in the chain.
    pub max_retries_per_provider: u32,
    /// Base delay for the per-provider retry backoff.
    pub retry_base_delay: Duration,
}

/// Ordered fallback chain of LLM providers, each guarded by its own
/// circuit breaker.
pub struct LlmFallbackService {
    config: LlmFallbackConfig,
    client: Arc<dyn LlmProviderClient>,
    breakers: Vec<Arc<CircuitBreaker>>,
    metrics: Arc<Metrics>,
}

impl LlmFallbackService {
    /// Construct a fallback service. `client` is shared by every provider
    /// entry — providers differ by [`ProviderConfig`], not by transport.
    #[must_use]
    pub fn new(config: LlmFallbackConfig, client: Arc<dyn LlmProviderClient>, metrics: Arc<Metrics>) -> Self {
        let breakers = Self::breaker_names(&config)
            .into_iter()
            .map(|name| {
                Arc::new(CircuitBreaker::new(CircuitBreakerConfig::new(
                    name,
                    5,
                    Duration::from_secs(60),
                )))
            })
            .collect();
        Self {
            config,
            client,
            breakers,
            metrics,
        }
    }

    fn breaker_names(config: &LlmFallbackConfig) -> Vec<String> {
        let mut names = vec!["llm_primary".to_string()];
        names.extend(
            (0..config.fallback_chain.len()).map(|i| format!("llm_fallback_{i}")),
        );
        names
    }

    fn attempts(&self) -> impl Iterator<Item = &ProviderConfig> {
        std::iter::once(&self.config.primary).chain(self.config.fallback_chain.iter())
    }

    fn provider_timeout(&self, provider: &ProviderConfig) -> Duration {
        provider
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_timeout)
    }

    fn record_attempt_metric(&self, provider: &str, outcome: &str) {
        if let Ok(counter) = self.metrics.counter(
            "llm_requests_total",
            "LLM requests by provider and outcome",
            &["provider", "outcome"],
        ) {
            counter.with_label_values(&[provider, outcome]).inc();
        }
    }

    fn record_fallback_metric(&self, from: &str, to: &str, reason: &str) {
        if let Ok(counter) = self.metrics.counter(
            "llm_fallback_total",
            "Fallbacks from one provider to the next, by reason",
            &["from", "to", "reason"],
        ) {
            counter.with_label_values(&[from, to, reason]).inc();
        }
    }

    fn record_latency_metric(&self, provider: &str, seconds: f64) {
        if let Ok(histogram) = self.metrics.histogram(
            "llm_latency_seconds",
            "LLM provider call latency",
            &["provider"],
            None,
        ) {
            histogram.with_label_values(&[provider]).observe(seconds);
        }
    }

    fn record_tokens_metric(&self, provider: &str, direction: &str, count: u32) {
        if count == 0 {
            return;
        }
        if let Ok(counter) = self.metrics.counter(
            "llm_tokens_total",
            "Tokens consumed or generated, by direction and provider",
            &["direction", "provider"],
        ) {
            counter.with_label_values(&[direction, provider]).inc_by(f64::from(count));
        }
    }

    /// Run `request` through the fallback chain per §4.5.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Auth`] or [`LlmError::Client`] immediately
    /// without falling back (step 4). Returns [`LlmError::Unavailable`]
    /// when every provider in the chain is exhausted.
    pub async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = Instant::now();
        let mut trail: Vec<AttemptRecord> = Vec::new();
        let mut attempts_made: u32 = 0;

        for (index, (provider, breaker)) in self.attempts().zip(self.breakers.iter()).enumerate() {
            let retry_config = RetryConfig {
                max_retries: self.config.max_retries_per_provider,
                base_delay: self.config.retry_base_delay,
                max_delay: self.config.retry_base_delay * 8,
                exponential_base: 2.0,
                jitter: true,
            };
            let timeout = request.timeout.unwrap_or_else(|| self.provider_timeout(provider));

            let attempt_start = Instant::now();
            let result = protected_call(
                breaker,
                &retry_config,
                "llm_provider_call",
                timeout,
                |err: &ProviderError| err.classify().is_retryable(),
                |err: &ProviderError| err.classify().is_retryable(),
                || self.client.complete(provider, request),
            )
            .await;
            attempts_made += 1;
            self.record_latency_metric(&provider.provider, attempt_start.elapsed().as_secs_f64());

            match result {
                Ok(mut response) => {
                    response.attempts = attempts_made;
                    response.was_fallback = index > 0;
                    response.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                    if let Some(tokens_in) = response.tokens_in {
                        self.record_tokens_metric(&provider.provider, "in", tokens_in);
                    }
                    if let Some(tokens_out) = response.tokens_out {
                        self.record_tokens_metric(&provider.provider, "out", tokens_out);
                    }
                    self.record_attempt_metric(&provider.provider, "success");
                    return Ok(response);
                }
                Err(ProtectedCallError::Inner(err)) => {
                    let class = err.classify();
                    self.record_attempt_metric(&provider.provider, "error");
                    if class.aborts_fallback() {
                        return Err(match class {
                            ErrorClass::Auth => LlmError::Auth {
                                provider: provider.provider.clone(),
                            },
                            _ => LlmError::Client {
                                provider: provider.provider.clone(),
                                message: err.to_string(),
                            },
                        });
                    }
                    trail.push(AttemptRecord {
                        provider: provider.provider.clone(),
                        model: provider.model.clone(),
                        reason: err.to_string(),
                    });
                }
                Err(ProtectedCallError::Timeout(timeout_err)) => {
                    self.record_attempt_metric(&provider.provider, "timeout");
                    trail.push(AttemptRecord {
                        provider: provider.provider.clone(),
                        model: provider.model.clone(),
                        reason: timeout_err.to_string(),
                    });
                }
                Err(ProtectedCallError::CircuitOpen(open_err)) => {
                    self.record_attempt_metric(&provider.provider, "circuit_open");
                    trail.push(AttemptRecord {
                        provider: provider.provider.clone(),
                        model: provider.model.clone(),
                        reason: open_err.to_string(),
                    });
                }
            }

            if let Some(next) = self.attempts().nth(index + 1) {
                self.record_fallback_metric(&provider.provider, &next.provider, "exhausted");
            }
        }

        let last_error = trail
            .last()
            .map(|record| record.reason.clone())
            .unwrap_or_else(|| "no providers configured".to_string());
        Err(LlmError::Unavailable {
            attempts: trail,
            last_error,
        })
    }

    /// Streaming variant of [`Self::complete`] (§4.5). Each attempt's
    /// *connection* is protected by the same breaker/retry/timeout stack as
    /// `complete`; once a provider's stream starts yielding chunks, errors
    /// from later chunks are surfaced on the stream itself rather than
    /// triggering a fallback to the next provider — a partially-streamed
    /// response is never restarted elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Auth`] or [`LlmError::Client`] immediately
    /// without falling back. Returns [`LlmError::Unavailable`] when every
    /// provider's connection attempt is exhausted.
    pub async fn complete_stream(
        &self,
        request: &LlmRequest,
    ) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        let mut trail: Vec<AttemptRecord> = Vec::new();

        for (index, (provider, breaker)) in self.attempts().zip(self.breakers.iter()).enumerate() {
            let retry_config = RetryConfig {
                max_retries: self.config.max_retries_per_provider,
                base_delay: self.config.retry_base_delay,
                max_delay: self.config.retry_base_delay * 8,
                exponential_base: 2.0,
                jitter: true,
            };
            let timeout = request.timeout.unwrap_or_else(|| self.provider_timeout(provider));

            let result = protected_call(
                breaker,
                &retry_config,
                "llm_stream_connect",
                timeout,
                |err: &ProviderError| err.classify().is_retryable(),
                |err: &ProviderError| err.classify().is_retryable(),
                || self.client.complete_stream(provider, request),
            )
            .await;

            match result {
                Ok(stream) => {
                    self.record_attempt_metric(&provider.provider, "success");
                    let provider_name = provider.provider.clone();
                    return Ok(stream
                        .map(move |chunk| {
                            chunk.map_err(|err| LlmError::Client {
                                provider: provider_name.clone(),
                                message: err.to_string(),
                            })
                        })
                        .boxed());
                }
                Err(ProtectedCallError::Inner(err)) => {
                    let class = err.classify();
                    self.record_attempt_metric(&provider.provider, "error");
                    if class.aborts_fallback() {
                        return Err(match class {
                            ErrorClass::Auth => LlmError::Auth {
                                provider: provider.provider.clone(),
                            },
                            _ => LlmError::Client {
                                provider: provider.provider.clone(),
                                message: err.to_string(),
                            },
                        });
                    }
                    trail.push(AttemptRecord {
                        provider: provider.provider.clone(),
                        model: provider.model.clone(),
                        reason: err.to_string(),
                    });
                }
                Err(ProtectedCallError::Timeout(timeout_err)) => {
                    self.record_attempt_metric(&provider.provider, "timeout");
                    trail.push(AttemptRecord {
                        provider: provider.provider.clone(),
                        model: provider.model.clone(),
                        reason: timeout_err.to_string(),
                    });
                }
                Err(ProtectedCallError::CircuitOpen(open_err)) => {
                    self.record_attempt_metric(&provider.provider, "circuit_open");
                    trail.push(AttemptRecord {
                        provider: provider.provider.clone(),
                        model: provider.model.clone(),
                        reason: open_err.to_string(),
                    });
                }
            }

            if let Some(next) = self.attempts().nth(index + 1) {
                self.record_fallback_metric(&provider.provider, &next.provider, "connect_failed");
            }
        }

        let last_error = trail
            .last()
            .map(|record| record.reason.clone())
            .unwrap_or_else(|| "no providers configured".to_string());
        Err(LlmError::Unavailable {
            attempts: trail,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::provider::MockLlmProviderClient as MockClient;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request() -> LlmRequest {
        LlmRequest {
            prompt: "hi".to_string(),
            max_tokens: 100,
            temperature: 0.0,
            model_hint: None,
            timeout: None,
        }
    }

    fn provider(name: &str) -> ProviderConfig {
        ProviderConfig {
            provider: name.to_string(),
            model: format!("{name}-model"),
            endpoint: "https://example.invalid".to_string(),
            api_key: "key".to_string(),
            timeout_seconds: Some(10),
        }
    }

    fn config(fallback: ProviderConfig) -> LlmFallbackConfig {
        LlmFallbackConfig {
            primary: provider("primary"),
            fallback_chain: vec![fallback],
            default_timeout: Duration::from_secs(5),
            max_retries_per_provider: 0,
            retry_base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn falls_back_to_the_next_provider_on_server_error() {
        let mut mock = MockClient::new();
        let call_count = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&call_count);
        mock.expect_complete().returning(move |config, _req| {
            counted.fetch_add(1, Ordering::SeqCst);
            if config.provider == "primary" {
                Err(ProviderError::ServerError {
                    provider: "primary".to_string(),
                    message: "boom".to_string(),
                })
            } else {
                Ok(LlmResponse {
                    content: "ok".to_string(),
                    provider_used: config.provider.clone(),
                    model_used: config.model.clone(),
                    attempts: 0,
                    was_fallback: false,
                    duration_ms: 0,
                    tokens_in: None,
                    tokens_out: None,
                })
            }
        });

        let service = LlmFallbackService::new(config(provider("fallback")), Arc::new(mock), Arc::new(Metrics::new()));
        let response = service.complete(&request()).await.expect("fallback succeeds");
        assert_eq!(response.provider_used, "fallback");
        assert!(response.was_fallback);
        assert_eq!(response.attempts, 2);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn auth_error_aborts_without_falling_back() {
        let mut mock = MockClient::new();
        mock.expect_complete().returning(|_config, _req| {
            Err(ProviderError::Auth {
                provider: "primary".to_string(),
            })
        });

        let service = LlmFallbackService::new(config(provider("fallback")), Arc::new(mock), Arc::new(Metrics::new()));
        let err = service.complete(&request()).await.expect_err("auth aborts");
        assert!(matches!(err, LlmError::Auth { .. }));
    }

    #[tokio::test]
    async fn exhausted_chain_reports_unavailable_with_trail() {
        let mut mock = MockClient::new();
        mock.expect_complete().returning(|config, _req| {
            Err(ProviderError::ServerError {
                provider: config.provider.clone(),
                message: "down".to_string(),
            })
        });

        let service = LlmFallbackService::new(config(provider("fallback")), Arc::new(mock), Arc::new(Metrics::new()));
        let err = service.complete(&request()).await.expect_err("chain exhausted");
        match err {
            LlmError::Unavailable { attempts, .. } => assert_eq!(attempts.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_falls_back_when_the_primary_fails_to_connect() {
        let mut mock = MockClient::new();
        mock.expect_complete_stream().returning(|config, _req| {
            if config.provider == "primary" {
                Err(ProviderError::ServerError {
                    provider: "primary".to_string(),
                    message: "boom".to_string(),
                })
            } else {
                let chunks = vec![Ok("hello".to_string()), Ok(" world".to_string())];
                Ok(futures_util::stream::iter(chunks).boxed())
            }
        });

        let service = LlmFallbackService::new(config(provider("fallback")), Arc::new(mock), Arc::new(Metrics::new()));
        let mut stream = service.complete_stream(&request()).await.expect("fallback connects");
        let mut collected = String::new();
        while let Some(chunk) = stream.next().await {
            collected.push_str(&chunk.expect("chunk ok"));
        }
        assert_eq!(collected, "hello world");
    }

    #[tokio::test]
    async fn stream_auth_error_aborts_without_falling_back() {
        let mut mock = MockClient::new();
        mock.expect_complete_stream().returning(|_config, _req| {
            Err(ProviderError::Auth {
                provider: "primary".to_string(),
            })
        });

        let service = LlmFallbackService::new(config(provider("fallback")), Arc::new(mock), Arc::new(Metrics::new()));
        let err = service.complete_stream(&request()).await.expect_err("auth aborts");
        assert!(matches!(err, LlmError::Auth { .. }));
    }

    #[tokio::test]
    async fn stream_errors_mid_stream_do_not_trigger_a_fallback() {
        let mut mock = MockClient::new();
        mock.expect_complete_stream().returning(|config, _req| {
            let provider_name = config.provider.clone();
            let chunks = vec![
                Ok("partial".to_string()),
                Err(ProviderError::ServerError {
                    provider: provider_name,
                    message: "dropped".to_string(),
                }),
            ];
            Ok(futures_util::stream::iter(chunks).boxed())
        });

        let service = LlmFallbackService::new(config(provider("fallback")), Arc::new(mock), Arc::new(Metrics::new()));
        let mut stream = service.complete_stream(&request()).await.expect("primary connects");
        let first = stream.next().await.expect("first chunk").expect("ok");
        assert_eq!(first, "partial");
        let second = stream.next().await.expect("second chunk");
        assert!(matches!(second, Err(LlmError::Client { ref provider, .. }) if provider == "primary"));
        assert!(stream.next().await.is_none());
    }
}
