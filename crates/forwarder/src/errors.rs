//! Error and retry-policy types for the forwarding domain.
//!
//! [`ForwardError`] is the per-invocation failure surfaced to the trigger
//! runtime. The port error types ([`StoreError`], [`CredentialError`],
//! [`WebhookError`]) are what infrastructure adapters return; the forwarder
//! folds them into [`ForwardError`].
//!
//! [`RetryPolicy`] tells the caller whether re-delivering the whole trigger is
//! useful. The forwarder itself never retries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Endpoint, SecretRef};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether a failed invocation is worth re-delivering.
///
/// - `Retryable`: nothing was recorded in the dedup store, so a redelivery
///   will be evaluated afresh.
/// - `NonRetryable`: the input is unusable, or the dedup record was already
///   written and a redelivery would be suppressed as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The trigger may be re-delivered.
    Retryable,
    /// Re-delivery cannot change the outcome.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// Failures of the deduplication store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached (refused, timed out, connection dropped).
    #[error("store unreachable at {node}: {message}")]
    Unavailable {
        /// Node address that failed.
        node: String,
        /// Underlying failure description.
        message: String,
    },

    /// The store answered with an error or with something that is not valid
    /// protocol.
    #[error("store protocol error: {0}")]
    Protocol(String),

    /// A stored item carries a serialisation flag this client does not know.
    #[error("unknown serialisation format flag {flags} for key '{key}'")]
    UnknownFormat {
        /// Key that was read.
        key: String,
        /// Flag value found on the item.
        flags: u32,
    },

    /// Cluster node discovery returned nothing usable.
    #[error("store discovery failed: {0}")]
    Discovery(String),

    /// A conditional write kept losing to concurrent writers.
    #[error("conditional write for key '{key}' gave up after {attempts} attempts")]
    Contention {
        /// Key being written.
        key: String,
        /// Attempts made.
        attempts: u32,
    },
}

/// Failures of the credential provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The secret store could not be reached.
    #[error("secret store request failed: {0}")]
    Transport(String),

    /// The secret store refused the lookup.
    #[error("secret store returned {status}: {message}")]
    Rejected {
        /// HTTP status.
        status: u16,
        /// Error type or body reported by the store.
        message: String,
    },

    /// The secret exists but does not hold a `{"secret": ...}` document.
    #[error("secret is malformed: {0}")]
    Malformed(String),

    /// Local signing credentials are missing or unusable.
    #[error("credential provider is misconfigured: {0}")]
    Configuration(String),
}

/// Transport failure of the outbound webhook call.
///
/// A response with any status is not an error at this layer; the forwarder
/// decides what counts as success.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("webhook transport failed: {message}")]
pub struct WebhookError {
    /// Description of the transport failure.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Invocation errors
// ---------------------------------------------------------------------------

/// Reasons a single forwarding invocation failed.
///
/// There is no partial success: every variant means the invocation failed.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The trigger input is malformed. No side effects were performed.
    #[error("Invalid trigger event: {reason}")]
    InvalidTriggerEvent {
        /// What is wrong with the input.
        reason: String,
    },

    /// The dedup store could not be consulted or updated, so duplicate status
    /// is unknown. No forward was attempted.
    #[error("Dedup store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// The shared secret could not be fetched.
    ///
    /// The dedup record may already have been written, in which case this
    /// event is now marked processed without having been forwarded.
    #[error("Credential unavailable for '{secret_ref}': {source}")]
    CredentialUnavailable {
        /// The reference that failed to resolve.
        secret_ref: SecretRef,
        /// Underlying provider failure.
        #[source]
        source: CredentialError,
    },

    /// The endpoint answered with a non-2xx status (`status` is set) or could
    /// not be reached (`status` is `None`).
    #[error("Forward to {endpoint} failed: {}", describe_status(.status, .message))]
    ForwardFailed {
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Endpoint that was called.
        endpoint: Endpoint,
        /// Transport failure description, empty when a response was received.
        message: String,
    },
}

fn describe_status(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("HTTP {code}"),
        None => message.to_owned(),
    }
}

impl ForwardError {
    /// Stable name of the error kind, used when reporting to the runtime.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTriggerEvent { .. } => "InvalidTriggerEvent",
            Self::StoreUnavailable(_) => "StoreUnavailable",
            Self::CredentialUnavailable { .. } => "CredentialUnavailable",
            Self::ForwardFailed { .. } => "ForwardFailed",
        }
    }

    /// Whether re-delivering the trigger could change the outcome.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::StoreUnavailable(_) => RetryPolicy::Retryable,
            Self::InvalidTriggerEvent { .. }
            | Self::CredentialUnavailable { .. }
            | Self::ForwardFailed { .. } => RetryPolicy::NonRetryable,
        }
    }
}
