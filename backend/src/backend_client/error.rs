//! Narrow error type for the backend client (C4).

use thiserror::Error;

/// Error raised by a [`super::BackendClient`] call.
#[derive(Debug, Error)]
pub enum BackendClientError {
    /// The backend returned a non-2xx status.
    #[error("backend returned status {status} for {endpoint}: {body_preview}")]
    Http {
        /// HTTP status code returned.
        status: u16,
        /// Normalised endpoint token, for correlating with metrics.
        endpoint: String,
        /// A truncated preview of the response body, for diagnostics.
        body_preview: String,
    },
    /// The request exceeded its configured timeout.
    #[error("request to {endpoint} timed out")]
    Timeout {
        /// Normalised endpoint token.
        endpoint: String,
    },
    /// A network-level failure occurred before a status could be read.
    #[error("transport error calling {endpoint}: {source}")]
    Transport {
        /// Normalised endpoint token.
        endpoint: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The response body was not valid JSON.
    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        /// Normalised endpoint token.
        endpoint: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
}

impl BackendClientError {
    /// The normalised endpoint token this error occurred on, for logging.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Http { endpoint, .. }
            | Self::Timeout { endpoint }
            | Self::Transport { endpoint, .. }
            | Self::Decode { endpoint, .. } => endpoint,
        }
    }
}
