//! Decoding of the `AAFT_DATA` client payload
//!
//! The orchestrator forwards `client_payload.data` as base64-encoded JSON.
//! Some shells keep the surrounding quotes, so one wrapping pair is tolerated.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Remove one pair of wrapping double quotes, if both are present.
pub fn strip_wrapping_quotes(raw: &str) -> &str {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}

/// Decode a client-data blob into its JSON object.
pub fn decode_client_data(raw: Option<&str>) -> Result<Map<String, Value>, DecodeError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or(DecodeError::Missing)?;
    let unquoted = strip_wrapping_quotes(raw);
    if unquoted.is_empty() {
        return Err(DecodeError::Missing);
    }

    let bytes = STANDARD.decode(unquoted)?;
    let json = String::from_utf8(bytes)?;

    match serde_json::from_str::<Value>(&json)? {
        Value::Object(map) => Ok(map),
        other => Err(DecodeError::NotAnObject(json_kind(&other))),
    }
}

/// Encode a JSON object the way the orchestrator does.
pub fn encode_client_data(data: &Map<String, Value>) -> String {
    // Serializing a Map<String, Value> cannot fail.
    let json = Value::Object(data.clone()).to_string();
    STANDARD.encode(json)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
