//! Reversible compression of index and chunk payloads.
//!
//! A payload is serialized to compact JSON, compressed with zstd and stored as
//! a base64 string, so the backend still sees a JSON value. Whether a stored
//! value went through the codec is recorded in a separate flag key and never
//! guessed from the content.

use crate::error::CodecError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use std::io::Cursor;

/// Default zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Compress a JSON payload into a base64 string.
pub fn encode(payload: &Value, level: i32) -> Result<String, CodecError> {
    let json = serde_json::to_vec(payload)?;
    let compressed =
        zstd::stream::encode_all(Cursor::new(json), level).map_err(CodecError::Compress)?;
    Ok(STANDARD.encode(compressed))
}

/// Inverse of [`encode`].
pub fn decode(text: &str) -> Result<Value, CodecError> {
    let compressed = STANDARD.decode(text)?;
    let json = zstd::stream::decode_all(Cursor::new(compressed)).map_err(CodecError::Decompress)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Read a stored value, decoding it when the compressed flag is set.
///
/// A flagged value that is not a string, or does not decode, is corrupt.
pub fn read_stored(value: Value, compressed: bool) -> Result<Value, CodecError> {
    if !compressed {
        return Ok(value);
    }
    match value {
        Value::String(text) => decode(&text),
        other => Err(CodecError::Json(serde::de::Error::custom(format!(
            "expected an encoded string, found {}",
            json_kind(&other)
        )))),
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_decode_roundtrip() {
        let payload = json!({
            "groups": [{"id": "1", "name": "Reading", "tabs": [{"chunkIndex": 0, "count": 3}]}],
            "searchQuery": "rust"
        });
        let text = encode(&payload, DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert_eq!(decode(&text).unwrap(), payload);
    }

    #[test]
    fn test_encode_shrinks_repetitive_payload() {
        let items: Vec<Value> = (0..100)
            .map(|i| json!({"url": format!("https://example.com/{i}"), "title": "Example page"}))
            .collect();
        let payload = Value::Array(items);
        let raw = serde_json::to_string(&payload).unwrap();
        let text = encode(&payload, DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert!(text.len() < raw.len());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode("!!!not base64"), Err(CodecError::Base64(_))));
        // valid base64, not zstd
        assert!(matches!(
            decode(&STANDARD.encode(b"plain bytes")),
            Err(CodecError::Decompress(_))
        ));
    }

    #[test]
    fn test_read_stored_raw_passthrough() {
        let v = json!([1, 2, 3]);
        assert_eq!(read_stored(v.clone(), false).unwrap(), v);
        assert!(read_stored(v, true).is_err());
    }
}
