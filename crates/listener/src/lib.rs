//! Trigger event source for the forwarder.
//!
//! Receives trigger events from the AWS Lambda Runtime API, runs each one
//! through a [`forwarder::Forwarder`] within the invocation deadline, and
//! reports the outcome back to the runtime.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Runtime API transport, header parsing, and deadline
//! enforcement live here. The [`forwarder`] crate sees only
//! [`forwarder::TriggerPayload`] and [`forwarder::SourceName`].
//!
//! ## Reported error kinds
//!
//! | `errorType` | Cause |
//! |-------------|-------|
//! | `InvalidTriggerEvent` | Payload missing id, endpoint, or secret reference |
//! | `StoreUnavailable` | Dedup store unreachable or protocol failure |
//! | `CredentialUnavailable` | Shared secret could not be fetched or parsed |
//! | `ForwardFailed` | Webhook unreachable or answered non-2xx |
//! | `DeadlineExceeded` | Work still running when the runtime deadline passed |

pub mod invocation;
pub mod runtime;

pub use invocation::{
    handle_invocation, InvocationError, InvocationLoop, InvocationReport, REPORT_MARGIN,
};
pub use runtime::{ErrorReport, Invocation, LambdaRuntimeClient, RuntimeApiError, RUNTIME_API_VERSION};
