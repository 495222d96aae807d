//! Error types for the LLM fallback service (C5).

use thiserror::Error;

/// Classification a provider's raw failure falls into, used to decide
/// whether a fallback attempt should retry, fail over, or abort outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The provider call exceeded its timeout.
    Timeout,
    /// The provider reported rate limiting.
    RateLimit,
    /// The provider rejected the request's credentials.
    Auth,
    /// The provider returned a 5xx-equivalent failure.
    ServerError,
    /// The provider rejected the request itself (4xx-equivalent, not auth).
    ClientError,
    /// The provider's circuit breaker was open.
    CircuitOpen,
}

impl ErrorClass {
    /// `true` for classes this service's retry layer should retry:
    /// `{TIMEOUT, RATE_LIMIT, SERVER_ERROR}` per §4.5.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimit | Self::ServerError)
    }

    /// `true` for classes that must never be masked by falling back to the
    /// next provider — an auth failure or a client error is the caller's
    /// problem, not a transient availability issue.
    #[must_use]
    pub const fn aborts_fallback(self) -> bool {
        matches!(self, Self::Auth | Self::ClientError)
    }
}

/// Raw failure from a single provider call, before classification.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider call exceeded its timeout.
    #[error("provider '{provider}' timed out")]
    Timeout {
        /// Provider name this failure came from.
        provider: String,
    },
    /// The provider reported HTTP 429 or an equivalent rate-limit signal.
    #[error("provider '{provider}' rate limited the request")]
    RateLimit {
        /// Provider name this failure came from.
        provider: String,
    },
    /// The provider rejected the configured credentials.
    #[error("provider '{provider}' rejected credentials")]
    Auth {
        /// Provider name this failure came from.
        provider: String,
    },
    /// The provider returned a server-side failure.
    #[error("provider '{provider}' returned a server error: {message}")]
    ServerError {
        /// Provider name this failure came from.
        provider: String,
        /// Provider-supplied message, if any.
        message: String,
    },
    /// The provider rejected the request shape itself.
    #[error("provider '{provider}' rejected the request: {message}")]
    ClientError {
        /// Provider name this failure came from.
        provider: String,
        /// Provider-supplied message, if any.
        message: String,
    },
}

impl ProviderError {
    /// Classify this failure for the fallback service's retry/abort logic.
    #[must_use]
    pub const fn classify(&self) -> ErrorClass {
        match self {
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::RateLimit { .. } => ErrorClass::RateLimit,
            Self::Auth { .. } => ErrorClass::Auth,
            Self::ServerError { .. } => ErrorClass::ServerError,
            Self::ClientError { .. } => ErrorClass::ClientError,
        }
    }

    /// The provider name this failure came from.
    #[must_use]
    pub fn provider(&self) -> &str {
        match self {
            Self::Timeout { provider }
            | Self::RateLimit { provider }
            | Self::Auth { provider }
            | Self::ServerError { provider, .. }
            | Self::ClientError { provider, .. } => provider,
        }
    }
}

/// One entry in an exhausted fallback chain's attempt trail.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// Provider this attempt targeted.
    pub provider: String,
    /// Model this attempt targeted.
    pub model: String,
    /// Human-readable reason the attempt did not succeed.
    pub reason: String,
}

/// Error surfaced by [`super::LlmFallbackService::complete`].
#[derive(Debug, Error)]
pub enum LlmError {
    /// Every provider in the chain was exhausted.
    #[error("all LLM providers exhausted after {} attempts: {last_error}", attempts.len())]
    Unavailable {
        /// The full attempt trail, in chain order.
        attempts: Vec<AttemptRecord>,
        /// The final provider's failure message.
        last_error: String,
    },
    /// The primary attempt failed with an auth error; fallback was
    /// deliberately skipped so this isn't masked as a transient outage.
    #[error("provider '{provider}' rejected credentials")]
    Auth {
        /// Provider whose credentials were rejected.
        provider: String,
    },
    /// The primary attempt failed with a client error; fallback was
    /// deliberately skipped.
    #[error("provider '{provider}' rejected the request: {message}")]
    Client {
        /// Provider that rejected the request.
        provider: String,
        /// Provider-supplied message.
        message: String,
    },
}
