//! The forwarding decision: suppress duplicates, then post the webhook.
//!
//! ## Delivery guarantee
//!
//! The dedup record is written *before* the credential fetch and the outbound
//! call. A failure after that point leaves the event marked as processed, so a
//! redelivery of the same id is suppressed. This is at-most-once forwarding:
//! a firing is never sent twice by sequential redeliveries, but may be sent
//! zero times when the credential fetch or the endpoint fails.
//!
//! With [`DedupStrategy::CheckThenSet`] two replicas handling the same id at
//! the same moment can both read the old record and both forward. Use
//! [`DedupStrategy::ConditionalWrite`] with a store that implements an atomic
//! [`DedupStore::set_if_not_equal`] to close that window.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    CredentialProvider, DedupKey, DedupStore, ForwardError, ForwardOutcome, InvocationId,
    SourceName, TriggerEvent, TriggerPayload, WebhookClient,
};

/// How the dedup record is consulted and updated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupStrategy {
    /// Read the record, compare, then write. Two store round trips with a race
    /// window between them.
    #[default]
    CheckThenSet,
    /// A single conditional write that only succeeds if the stored id differs.
    ConditionalWrite,
}

impl std::str::FromStr for DedupStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check-then-set" => Ok(Self::CheckThenSet),
            "conditional-write" => Ok(Self::ConditionalWrite),
            other => Err(format!(
                "unknown dedup strategy '{other}' (expected 'check-then-set' or 'conditional-write')"
            )),
        }
    }
}

/// Forwards trigger events to their endpoints at most once per event id.
///
/// Holds no per-event state; every piece of shared state lives behind the
/// [`DedupStore`].
pub struct Forwarder {
    store: Arc<dyn DedupStore>,
    credentials: Arc<dyn CredentialProvider>,
    webhook: Arc<dyn WebhookClient>,
    strategy: DedupStrategy,
    key_prefix: Option<String>,
}

impl Forwarder {
    /// Creates a forwarder using [`DedupStrategy::CheckThenSet`] and no key prefix.
    pub fn new(
        store: Arc<dyn DedupStore>,
        credentials: Arc<dyn CredentialProvider>,
        webhook: Arc<dyn WebhookClient>,
    ) -> Self {
        Self {
            store,
            credentials,
            webhook,
            strategy: DedupStrategy::default(),
            key_prefix: None,
        }
    }

    /// Selects the dedup strategy.
    pub fn with_strategy(mut self, strategy: DedupStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Namespaces dedup keys, for caches shared with other applications.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.key_prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// Returns the configured strategy.
    pub fn strategy(&self) -> DedupStrategy {
        self.strategy
    }

    /// Validates a raw payload against `source` and forwards it.
    ///
    /// Validation happens before any store access, so an
    /// [`ForwardError::InvalidTriggerEvent`] has no side effects.
    pub async fn handle(
        &self,
        payload: TriggerPayload,
        source: SourceName,
    ) -> Result<ForwardOutcome, ForwardError> {
        let event = TriggerEvent::from_payload(payload, source)?;
        self.forward(&event).await
    }

    /// Forwards `event` unless it is a redelivery of the last forwarded id.
    #[instrument(
        skip_all,
        fields(
            invocation_id = %InvocationId::new_random(),
            source = %event.source,
            event_id = %event.id,
            endpoint = %event.endpoint,
        )
    )]
    pub async fn forward(&self, event: &TriggerEvent) -> Result<ForwardOutcome, ForwardError> {
        let key = DedupKey::for_source(&event.source, self.key_prefix.as_deref()).ok_or_else(|| {
            ForwardError::InvalidTriggerEvent {
                reason: format!("source name '{}' does not yield a usable dedup key", event.source),
            }
        })?;

        if !self.record(&key, event).await? {
            info!(key = %key, "Duplicate trigger suppressed");
            return Ok(ForwardOutcome::Duplicate);
        }

        let credential = self
            .credentials
            .fetch(&event.secret_ref)
            .await
            .map_err(|source| {
                warn!(error = %source, "Credential fetch failed after dedup record was written");
                ForwardError::CredentialUnavailable {
                    secret_ref: event.secret_ref.clone(),
                    source,
                }
            })?;

        info!("POST request to {}", event.endpoint);
        let status = self
            .webhook
            .post(&event.endpoint, &credential)
            .await
            .map_err(|e| {
                warn!(error = %e, "Webhook transport failed");
                ForwardError::ForwardFailed {
                    status: None,
                    endpoint: event.endpoint.clone(),
                    message: e.message,
                }
            })?;

        if !(200..300).contains(&status) {
            warn!(status, "Webhook rejected");
            return Err(ForwardError::ForwardFailed {
                status: Some(status),
                endpoint: event.endpoint.clone(),
                message: String::new(),
            });
        }

        info!(status, "Webhook delivered");
        Ok(ForwardOutcome::Forwarded { status })
    }

    /// Records `event.id` as the last seen id for `key`.
    ///
    /// Returns `false` when the record already held this id.
    async fn record(&self, key: &DedupKey, event: &TriggerEvent) -> Result<bool, ForwardError> {
        let id = event.id.as_str();
        match self.strategy {
            DedupStrategy::CheckThenSet => {
                let previous = self
                    .store
                    .get(key)
                    .await
                    .map_err(ForwardError::StoreUnavailable)?;
                if previous.as_deref() == Some(id) {
                    return Ok(false);
                }
                self.store
                    .set(key, id)
                    .await
                    .map_err(ForwardError::StoreUnavailable)?;
                Ok(true)
            }
            DedupStrategy::ConditionalWrite => self
                .store
                .set_if_not_equal(key, id)
                .await
                .map_err(ForwardError::StoreUnavailable),
        }
    }
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("strategy", &self.strategy)
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}
