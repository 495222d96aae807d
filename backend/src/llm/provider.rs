//! Provider trait and request/response shapes for the LLM fallback service.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use super::error::ProviderError;

/// A finite lazy sequence of response chunks from a streaming completion.
pub type LlmChunkStream = BoxStream<'static, Result<String, ProviderError>>;

/// A single completion request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// The prompt text.
    pub prompt: String,
    /// Maximum tokens the provider should generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Optional hint overriding the provider's configured model for this
    /// call only.
    pub model_hint: Option<String>,
    /// Optional per-call timeout override.
    pub timeout: Option<Duration>,
}

/// The result of a completion, including which provider ultimately served
/// it and how many attempts that took.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Generated text.
    pub content: String,
    /// Provider name that produced this response.
    pub provider_used: String,
    /// Model name that produced this response.
    pub model_used: String,
    /// Total attempts made across the whole fallback chain.
    pub attempts: u32,
    /// Whether a provider other than the primary served this request.
    pub was_fallback: bool,
    /// Wall-clock duration of the whole `complete` call.
    pub duration_ms: u64,
    /// Prompt tokens consumed, when the provider reports usage.
    pub tokens_in: Option<u32>,
    /// Completion tokens generated, when the provider reports usage.
    pub tokens_out: Option<u32>,
}

/// Configuration for one entry in the fallback chain.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider name, used as the circuit breaker name and metric label.
    pub provider: String,
    /// Model this provider should use.
    pub model: String,
    /// Endpoint URL, when the provider is HTTP-based.
    pub endpoint: String,
    /// API key, when the provider requires one.
    pub api_key: String,
    /// Per-provider timeout; falls back to the service's default when
    /// unset.
    pub timeout_seconds: Option<u64>,
}

/// A single LLM provider. Implementations own their own transport; the
/// fallback service wraps every call in retry/timeout/circuit-breaker
/// layers, so providers should surface raw, unclassified failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProviderClient: Send + Sync {
    /// Issue one completion request against this provider.
    async fn complete(
        &self,
        config: &ProviderConfig,
        request: &LlmRequest,
    ) -> Result<LlmResponse, ProviderError>;

    /// Issue one streaming completion request. The returned stream aborts at
    /// the first error; once it starts yielding chunks no other provider may
    /// take over (§4.5 — at most one provider serves a given stream).
    async fn complete_stream(
        &self,
        config: &ProviderConfig,
        request: &LlmRequest,
    ) -> Result<LlmChunkStream, ProviderError>;
}
