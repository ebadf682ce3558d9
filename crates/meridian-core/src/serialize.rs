use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Pack a value into deterministic bincode bytes.
///
/// This is the codec boundary for ABI blobs and persisted entities; a
/// change to the wire format invalidates existing snapshots.
pub fn pack<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    bincode::serialize(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Unpack a value from bincode bytes
pub fn unpack<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, CoreError> {
    bincode::deserialize(bytes).map_err(|e| CoreError::Deserialization(e.to_string()))
}

/// Serialize to JSON string (for human-authored definitions)
pub fn to_json<T: Serialize>(value: &T) -> Result<String, CoreError> {
    serde_json::to_string(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Serialize to pretty JSON string
pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<String, CoreError> {
    serde_json::to_string_pretty(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Deserialize from JSON string
pub fn from_json<'a, T: Deserialize<'a>>(json: &'a str) -> Result<T, CoreError> {
    serde_json::from_str(json).map_err(|e| CoreError::Deserialization(e.to_string()))
}
