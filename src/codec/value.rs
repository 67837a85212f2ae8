//! The JSON blob boundary.
//!
//! Every dynamically typed payload crosses the wire as a JSON document inside a
//! `bytes` field. This is the only place such payloads are serialized.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{PluginError, Result};

/// Literal written for an absent value by peers without presence flags.
pub(crate) const NULL_SENTINEL: &[u8] = b"null";

pub(crate) fn to_blob<T>(value: &T) -> serde_json::Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    serde_json::to_vec(value)
}

pub(crate) fn from_blob<T>(blob: &[u8]) -> serde_json::Result<T>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(blob)
}

/// True when the blob stands for "no value": empty, or the `null` literal.
pub(crate) fn is_absent(blob: &[u8]) -> bool {
    blob.is_empty() || blob.trim_ascii() == NULL_SENTINEL
}

/// Serializes an arbitrary value, such as the result of `execute`.
pub fn encode_value(value: &Value) -> Result<Vec<u8>> {
    to_blob(value).map_err(|e| PluginError::encode("result", e))
}

/// Deserializes an arbitrary value. An empty blob yields `Value::Null`.
pub fn decode_value(blob: &[u8]) -> Result<Value> {
    decode_dynamic(blob, "result")
}

pub(crate) fn decode_dynamic(
    blob: &[u8],
    field: &str,
) -> Result<Value> {
    if blob.is_empty() {
        return Ok(Value::Null);
    }
    from_blob(blob).map_err(|e| PluginError::decode(field, e))
}
