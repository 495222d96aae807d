//! Opaque envelope encoding for cached values.
//!
//! The original cache hierarchy called this "encryption", but it is base64
//! over a JSON serialisation with no confidentiality guarantee at all — its
//! own comment admits as much. This module keeps the mechanism (it is useful
//! as a stable, versioned wire shape for values crossing the L1/L2
//! boundary) but names it honestly: an envelope, not encryption (decision 2
//! in `DESIGN.md`).

use base64::Engine as _;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

const ENGINE: base64::engine::general_purpose::GeneralPurpose =
    base64::engine::general_purpose::STANDARD;

/// Error returned when an envelope fails to encode or decode.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The value could not be serialised to JSON.
    #[error("failed to serialise value for envelope encoding: {0}")]
    Serialize(#[source] serde_json::Error),
    /// The envelope payload was not valid base64.
    #[error("envelope payload was not valid base64: {0}")]
    Base64(#[source] base64::DecodeError),
    /// The decoded bytes were not valid UTF-8 JSON.
    #[error("failed to deserialise envelope payload: {0}")]
    Deserialize(#[source] serde_json::Error),
}

/// Encode `value` into an opaque envelope: `{"envelope": true, "data": <base64>}`.
pub fn encode<T: Serialize>(value: &T) -> Result<Value, EnvelopeError> {
    let json = serde_json::to_string(value).map_err(EnvelopeError::Serialize)?;
    let data = ENGINE.encode(json.as_bytes());
    Ok(serde_json::json!({ "envelope": true, "data": data }))
}

/// Decode a value previously produced by [`encode`]. Values that are not
/// envelopes (i.e. don't have `envelope: true`) are rejected; callers should
/// only call this when they know envelope encoding is enabled.
pub fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, EnvelopeError> {
    let data = value
        .get("data")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let bytes = ENGINE.decode(data).map_err(EnvelopeError::Base64)?;
    serde_json::from_slice(&bytes).map_err(EnvelopeError::Deserialize)
}

/// `true` when `value` looks like a previously-encoded envelope.
#[must_use]
pub fn is_envelope(value: &Value) -> bool {
    value.get("envelope").and_then(Value::as_bool) == Some(true)
}
