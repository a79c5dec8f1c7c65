//! Newtype domain identifiers.
//!
//! Every value with an identity is a distinct newtype wrapping a primitive. This
//! prevents accidentally passing a [`SecretRef`] where an [`EventId`] is
//! expected even though both are plain strings on the wire.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest key memcached accepts, in bytes.
pub const MAX_KEY_LEN: usize = 250;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty
            /// or only whitespace.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.trim().is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// Identifies one logical firing of a scheduled rule.
    ///
    /// Redeliveries of the same firing carry the same id; that is what the
    /// dedup record compares against.
    EventId
}

string_id! {
    /// Opaque reference to the shared secret (e.g. a Secrets Manager ARN).
    SecretRef
}

string_id! {
    /// Stable identity of the trigger source: the deployed function or rule name.
    ///
    /// Taken from the execution context, never from the event payload.
    SourceName
}

// ---------------------------------------------------------------------------

/// Key under which the last forwarded event id is stored for one source.
///
/// Derived from the [`SourceName`] so it is stable per schedule, not per event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey(String);

impl DedupKey {
    /// Derives the key for `source`, with an optional namespace `prefix`.
    ///
    /// Whitespace and control characters are replaced by `_`, since the cache
    /// protocol uses them as delimiters. Returns `None` when the resulting key
    /// exceeds [`MAX_KEY_LEN`] bytes.
    pub fn for_source(source: &SourceName, prefix: Option<&str>) -> Option<Self> {
        let raw = match prefix {
            Some(p) if !p.is_empty() => format!("{p}{}", source.as_str()),
            _ => source.as_str().to_owned(),
        };
        let key: String = raw
            .chars()
            .map(|c| if c.is_whitespace() || c.is_control() { '_' } else { c })
            .collect();
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            None
        } else {
            Some(Self(key))
        }
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------

/// Identifies a single invocation of the forwarder.
///
/// Generated fresh for every invocation and attached to its tracing span so all
/// activity from one invocation can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Generates a new random invocation identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
