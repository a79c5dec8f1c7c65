//! Port traits implemented by infrastructure crates.
//!
//! The forwarder depends only on these traits. `memcache` supplies the
//! [`DedupStore`], `secrets` the [`CredentialProvider`], and `webhook` the
//! [`WebhookClient`].

use async_trait::async_trait;

use crate::{Credential, CredentialError, DedupKey, Endpoint, SecretRef, StoreError, WebhookError};

/// Shared key/value cache holding the last forwarded event id per source.
///
/// Implementations must not keep state in process memory when used across
/// replicas: every replica must observe every other replica's writes.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Returns the last value written for `key`, or `None` if it was never
    /// written or has been evicted.
    async fn get(&self, key: &DedupKey) -> Result<Option<String>, StoreError>;

    /// Unconditionally stores `value` under `key`.
    async fn set(&self, key: &DedupKey, value: &str) -> Result<(), StoreError>;

    /// Stores `value` unless the current value already equals it.
    ///
    /// Returns `true` when the value was written and `false` when it was
    /// already present. The default is a plain read followed by a write and
    /// therefore not atomic; stores with a compare-and-set primitive should
    /// override it.
    async fn set_if_not_equal(&self, key: &DedupKey, value: &str) -> Result<bool, StoreError> {
        if self.get(key).await?.as_deref() == Some(value) {
            return Ok(false);
        }
        self.set(key, value).await?;
        Ok(true)
    }
}

/// Keyed lookup of the shared secret attached to outbound calls.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Resolves `secret_ref` to a credential.
    async fn fetch(&self, secret_ref: &SecretRef) -> Result<Credential, CredentialError>;
}

/// Outbound HTTP transport for the webhook POST.
#[async_trait]
pub trait WebhookClient: Send + Sync {
    /// Posts an empty body to `endpoint` with the `X-Cron-Auth` header set to
    /// the credential's token.
    ///
    /// Returns the response status for any response, including non-2xx ones.
    /// Only a failure to obtain a response is an error.
    async fn post(&self, endpoint: &Endpoint, credential: &Credential) -> Result<u16, WebhookError>;
}
