//! Value Serializer
//!
//! Drivers that persist text (the flat local store, the SQL store, the memory
//! store) convert values through a [`Serializer`]. Failures surface as
//! rejected operations on whichever driver call invoked it.

use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Converts stored values to and from their persisted text form.
pub trait Serializer: Send + Sync {
    /// Encode a value.
    ///
    /// # Errors
    /// Returns `Serialization` if the value cannot be encoded.
    fn serialize(&self, value: &Value) -> StoreResult<String>;

    /// Decode a value.
    ///
    /// # Errors
    /// Returns `Deserialization` if the text is not a valid encoding.
    fn deserialize(&self, text: &str) -> StoreResult<Value>;
}

/// JSON text via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &Value) -> StoreResult<String> {
        serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn deserialize(&self, text: &str) -> StoreResult<Value> {
        serde_json::from_str(text).map_err(|e| StoreError::Deserialization(e.to_string()))
    }
}
