//! Item value serialisation.
//!
//! Memcached stores an opaque byte string plus a 32-bit `flags` word per
//! item. The flags record how the bytes were produced so that readers in any
//! language can decode them:
//!
//! | Flag | Encoding |
//! |------|----------|
//! | `1`  | UTF-8 string, stored verbatim |
//! | `2`  | JSON document |
//!
//! Strings are never JSON-quoted, so other consumers of the cache see the
//! exact id that was written.

use forwarder::StoreError;

/// Flag for a verbatim UTF-8 string.
pub const FLAG_TEXT: u32 = 1;
/// Flag for a JSON document.
pub const FLAG_JSON: u32 = 2;

/// A decoded cache value.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Text(String),
    Json(serde_json::Value),
}

impl CacheValue {
    /// Returns the wire bytes and the flags to store with them.
    pub fn encode(&self) -> (Vec<u8>, u32) {
        match self {
            Self::Text(s) => (s.as_bytes().to_vec(), FLAG_TEXT),
            Self::Json(v) => (v.to_string().into_bytes(), FLAG_JSON),
        }
    }

    /// Decodes an item read under `key`.
    pub fn decode(key: &str, flags: u32, data: Vec<u8>) -> Result<Self, StoreError> {
        match flags {
            FLAG_TEXT => String::from_utf8(data).map(Self::Text).map_err(|_| {
                StoreError::Protocol(format!("text item '{key}' is not valid UTF-8"))
            }),
            FLAG_JSON => serde_json::from_slice(&data).map(Self::Json).map_err(|e| {
                StoreError::Protocol(format!("JSON item '{key}' does not parse: {e}"))
            }),
            flags => Err(StoreError::UnknownFormat {
                key: key.to_owned(),
                flags,
            }),
        }
    }

    /// Collapses the value to a string for comparison with event ids.
    ///
    /// JSON strings are unwrapped; other JSON values keep their compact text.
    pub fn into_string(self) -> String {
        match self {
            Self::Text(s) | Self::Json(serde_json::Value::String(s)) => s,
            Self::Json(other) => other.to_string(),
        }
    }
}

impl From<&str> for CacheValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}
