//! Gateway-wide error taxonomy.
//!
//! Each component keeps its own narrow error type so it stays unit-testable
//! in isolation; this module is the one taxonomy those types convert into
//! at a component boundary, per the error-handling design note. Logging
//! happens at the point an error is first observed, not re-emitted at every
//! `From` conversion on the way up.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::backend_client::BackendClientError;
use crate::cache::CacheError;
use crate::graph::GraphError;
use crate::llm::LlmError;
use crate::resilience::CircuitBreakerError;

/// Stable machine-readable error code surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A downstream network call to the workload backend failed.
    BackendUnavailable,
    /// The workload backend returned a non-2xx status.
    BackendHttpError,
    /// An operation exceeded its deadline.
    Timeout,
    /// A circuit breaker refused the call.
    CircuitOpen,
    /// A cache operation failed; callers should treat this as a miss.
    CacheError,
    /// The LLM fallback chain was exhausted.
    LlmUnavailable,
    /// The dependency graph could not be built from its root node.
    GraphBuildError,
    /// A health recovery attempt failed.
    RecoveryFailed,
    /// Caller-supplied arguments failed validation.
    ValidationError,
    /// The process configuration is unusable.
    ConfigurationError,
}

/// Gateway-wide error, carrying a stable [`ErrorCode`], a human-readable
/// message, an optional correlation id, and optional structured details.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct Error {
    code: ErrorCode,
    message: String,
    correlation_id: Option<String>,
    details: Option<Value>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    /// Construct a new error with no correlation id or details.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            correlation_id: None,
            details: None,
            source: None,
        }
    }

    fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            correlation_id: None,
            details: None,
            source: Some(Box::new(source)),
        }
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Correlation identifier for tracing this error across logs.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Attach a correlation id, generating one if the caller doesn't have
    /// one yet.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Attach a freshly generated correlation id.
    #[must_use]
    pub fn with_new_correlation_id(self) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        self.with_correlation_id(id)
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Supplementary structured details.
    #[must_use]
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// `true` when the underlying condition is one that a caller's own
    /// retry loop might reasonably retry (distinct from `resilience`'s
    /// internal retry, which already ran before this error surfaced).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::BackendUnavailable | ErrorCode::Timeout | ErrorCode::BackendHttpError
        )
    }
}

impl From<BackendClientError> for Error {
    fn from(err: BackendClientError) -> Self {
        let code = match &err {
            BackendClientError::Http { .. } => ErrorCode::BackendHttpError,
            BackendClientError::Timeout { .. } => ErrorCode::Timeout,
            BackendClientError::Transport { .. } | BackendClientError::Decode { .. } => {
                ErrorCode::BackendUnavailable
            }
        };
        Self::with_source(code, err.to_string(), err)
    }
}

impl From<CacheError> for Error {
    fn from(err: CacheError) -> Self {
        Self::with_source(ErrorCode::CacheError, err.to_string(), err)
    }
}

impl From<LlmError> for Error {
    fn from(err: LlmError) -> Self {
        let code = match &err {
            LlmError::Unavailable { .. } => ErrorCode::LlmUnavailable,
            LlmError::Auth { .. } | LlmError::Client { .. } => ErrorCode::ValidationError,
        };
        Self::with_source(code, err.to_string(), err)
    }
}

impl From<GraphError> for Error {
    fn from(err: GraphError) -> Self {
        Self::with_source(ErrorCode::GraphBuildError, err.to_string(), err)
    }
}

impl From<CircuitBreakerError> for Error {
    fn from(err: CircuitBreakerError) -> Self {
        Self::with_source(ErrorCode::CircuitOpen, err.to_string(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_error_has_no_correlation_id() {
        let err = Error::new(ErrorCode::ValidationError, "bad input");
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(err.message(), "bad input");
        assert!(err.correlation_id().is_none());
    }

    #[test]
    fn with_correlation_id_round_trips() {
        let err = Error::new(ErrorCode::Timeout, "x").with_correlation_id("abc-123");
        assert_eq!(err.correlation_id(), Some("abc-123"));
    }

    #[test]
    fn retryable_codes_match_the_taxonomy() {
        assert!(Error::new(ErrorCode::BackendUnavailable, "x").is_retryable());
        assert!(Error::new(ErrorCode::Timeout, "x").is_retryable());
        assert!(!Error::new(ErrorCode::ValidationError, "x").is_retryable());
        assert!(!Error::new(ErrorCode::CircuitOpen, "x").is_retryable());
    }
}
