//! Envelope codec: the `data` field is base64 encoded JSON.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};
use thiserror::Error;

use super::payload::CallbackPayload;

/// Reasons an envelope could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("envelope is not valid base64: {0}")]
    InvalidBase64(String),

    #[error("envelope is not valid UTF-8 JSON: {0}")]
    InvalidJson(String),

    #[error("envelope JSON is not an object")]
    NotAnObject,
}

/// Decodes the base64 `data` field of a callback into a payload document.
pub fn decode(data: &str) -> Result<CallbackPayload, CodecError> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| CodecError::InvalidBase64(e.to_string()))?;
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| CodecError::InvalidJson(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(CallbackPayload::new(map)),
        _ => Err(CodecError::NotAnObject),
    }
}

/// Encodes request parameters into the base64 `data` field.
pub fn encode(params: &Map<String, Value>) -> String {
    STANDARD.encode(Value::Object(params.clone()).to_string())
}
