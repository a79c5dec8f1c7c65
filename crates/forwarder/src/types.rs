//! Trigger and credential value types.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! validation rules (an [`Endpoint`] is an absolute HTTP(S) URL, a
//! [`TriggerEvent`] has every field present) and flow through the forwarding
//! decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{EventId, ForwardError, SecretRef, SourceName};

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Absolute `http` or `https` URL the webhook is posted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Url", into = "Url")]
pub struct Endpoint(Url);

impl Endpoint {
    /// Parses an [`Endpoint`], returning `None` unless `url` is a well-formed
    /// `http` or `https` URL with a host.
    pub fn new(url: impl AsRef<str>) -> Option<Self> {
        Url::parse(url.as_ref().trim()).ok().and_then(|u| Self::try_from(u).ok())
    }

    /// Returns the URL as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the parsed URL.
    pub fn as_url(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<Url> for Endpoint {
    type Error = String;

    fn try_from(url: Url) -> Result<Self, Self::Error> {
        match url.scheme() {
            "http" | "https" if url.host_str().is_some_and(|h| !h.is_empty()) => Ok(Self(url)),
            "http" | "https" => Err(format!("'{url}' has no host")),
            other => Err(format!("unsupported scheme '{other}'")),
        }
    }
}

impl From<Endpoint> for Url {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.0
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Trigger events
// ---------------------------------------------------------------------------

/// Raw trigger input as delivered by the scheduler.
///
/// Every field is optional here so that a malformed payload can be reported as
/// [`ForwardError::InvalidTriggerEvent`] rather than a deserialisation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPayload {
    /// Unique id of the scheduled firing.
    #[serde(default)]
    pub id: Option<String>,

    /// Target URL.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Reference to the shared secret. `secret_ref` is accepted as an alias.
    #[serde(default, alias = "secret_ref")]
    pub shared_secret_arn: Option<String>,
}

impl TriggerPayload {
    /// Decodes a payload from an arbitrary JSON value.
    ///
    /// Non-object values and fields of the wrong type are reported as
    /// [`ForwardError::InvalidTriggerEvent`].
    pub fn from_json(value: serde_json::Value) -> Result<Self, ForwardError> {
        serde_json::from_value(value).map_err(|e| ForwardError::InvalidTriggerEvent {
            reason: format!("payload is not a trigger object: {e}"),
        })
    }
}

/// A validated trigger event. Immutable; consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    /// Unique id of this firing.
    pub id: EventId,
    /// Where the webhook is posted.
    pub endpoint: Endpoint,
    /// Which secret carries the auth token.
    pub secret_ref: SecretRef,
    /// Identity of the scheduled rule or function that fired.
    pub source: SourceName,
}

impl TriggerEvent {
    /// Validates `payload` and binds it to `source`.
    ///
    /// Fails with [`ForwardError::InvalidTriggerEvent`] when `id`, `endpoint`,
    /// or the secret reference is missing or empty, or when the endpoint is not
    /// an absolute HTTP(S) URL.
    pub fn from_payload(payload: TriggerPayload, source: SourceName) -> Result<Self, ForwardError> {
        let id = payload
            .id
            .and_then(EventId::new)
            .ok_or_else(|| invalid("missing event id"))?;
        let endpoint = match payload.endpoint {
            None => return Err(invalid("missing endpoint")),
            Some(raw) => {
                Endpoint::new(raw.clone()).ok_or_else(|| invalid(format!("invalid endpoint '{raw}'")))?
            }
        };
        let secret_ref = payload
            .shared_secret_arn
            .and_then(SecretRef::new)
            .ok_or_else(|| invalid("missing secret reference"))?;

        Ok(Self {
            id,
            endpoint,
            secret_ref,
            source,
        })
    }
}

fn invalid(reason: impl Into<String>) -> ForwardError {
    ForwardError::InvalidTriggerEvent {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Shared authentication token sent as `X-Cron-Auth`.
///
/// Fetched fresh per invocation and never persisted. `Debug` output is
/// redacted so the token cannot leak through logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
}

#[derive(Deserialize)]
struct SecretDocument {
    secret: String,
}

impl Credential {
    /// Wraps a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Parses the secret document `{"secret": "<token>"}`.
    pub fn from_secret_json(document: &str) -> Result<Self, serde_json::Error> {
        let doc: SecretDocument = serde_json::from_str(document)?;
        Ok(Self::new(doc.secret))
    }

    /// Returns the token. Only transports should call this.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential").field("token", &"<redacted>").finish()
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What a successful invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ForwardOutcome {
    /// The webhook was posted and answered with a 2xx status.
    Forwarded {
        /// HTTP status returned by the endpoint.
        status: u16,
    },
    /// The event id matched the dedup record; nothing was sent.
    Duplicate,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from milliseconds since the Unix epoch.
    ///
    /// Returns `None` if the value is out of range.
    pub fn from_epoch_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(Self)
    }

    /// Returns the time left until `self`, or `None` if it has already passed.
    pub fn remaining_from(self, now: Timestamp) -> Option<std::time::Duration> {
        (self.0 - now.0).to_std().ok()
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
