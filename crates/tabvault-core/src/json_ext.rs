//! JSON value probing helpers.
//!
//! Stored values and import payloads are read as untyped JSON so a single bad
//! field can be repaired or dropped without failing the whole document. These
//! accessors keep the structural checks short.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Extension trait for probing fields of untyped JSON.
pub trait JsonExt {
    /// Get a string value, returning None if key missing or not a string
    fn get_str(&self, key: &str) -> Option<&str>;

    /// Get a non-empty string value
    fn get_non_empty_str(&self, key: &str) -> Option<&str>;

    /// Get a bool value, returning None if key missing or not a bool
    fn get_bool(&self, key: &str) -> Option<bool>;

    /// Get a u64 value, returning None if key missing or not a number
    fn get_u64(&self, key: &str) -> Option<u64>;

    /// Get an array value, returning None if key missing or not an array
    fn get_array(&self, key: &str) -> Option<&Vec<Value>>;

    /// Get an object value, returning None if key missing or not an object
    fn get_object(&self, key: &str) -> Option<&Map<String, Value>>;

    /// Get an RFC 3339 timestamp stored as a string
    fn get_timestamp(&self, key: &str) -> Option<DateTime<Utc>>;

    /// Get an identifier stored either as a string or as an integer.
    ///
    /// Older exports wrote browser tab ids as numbers.
    fn get_id(&self, key: &str) -> Option<String>;
}

impl JsonExt for Value {
    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    fn get_non_empty_str(&self, key: &str) -> Option<&str> {
        self.get_str(key).filter(|s| !s.is_empty())
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.as_u64())
    }

    fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.get(key).and_then(|v| v.as_array())
    }

    fn get_object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(|v| v.as_object())
    }

    fn get_timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        parse_timestamp(self.get_str(key)?)
    }

    fn get_id(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) if n.is_u64() || n.is_i64() => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
