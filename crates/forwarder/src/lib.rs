//! Core domain for the idempotent scheduled webhook forwarder.
//!
//! This crate decides whether a trigger event is forwarded and drives the
//! forward through port traits. Infrastructure crates implement the traits;
//! they never add forwarding rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`EventId`, `SourceName`, `DedupKey`, etc.) |
//! | [`types`] | Trigger payloads, endpoints, credentials, outcomes |
//! | [`errors`] | Invocation and port error types, retry policy |
//! | [`ports`] | `DedupStore`, `CredentialProvider`, `WebhookClient` |
//! | [`forwarder`] | The dedup-then-forward algorithm |
//! | [`memory`] | In-process `DedupStore` |
//! | [`schedule`] | Rule schedule expressions and target inputs |

pub mod errors;
pub mod forwarder;
pub mod identifiers;
pub mod memory;
pub mod ports;
pub mod schedule;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::{CredentialError, ForwardError, RetryPolicy, StoreError, WebhookError};
pub use forwarder::{DedupStrategy, Forwarder};
pub use identifiers::{DedupKey, EventId, InvocationId, SecretRef, SourceName, MAX_KEY_LEN};
pub use memory::InMemoryDedupStore;
pub use ports::{CredentialProvider, DedupStore, WebhookClient};
pub use schedule::{InputTransformer, PeriodUnits, Schedule, ScheduleError, ScheduleItem};
pub use types::{Credential, Endpoint, ForwardOutcome, Timestamp, TriggerEvent, TriggerPayload};
