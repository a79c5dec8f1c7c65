//! [`DedupStore`] over a memcached cluster.

use std::time::Duration;

use async_trait::async_trait;
use forwarder::{DedupKey, DedupStore, StoreError};
use tracing::{debug, instrument, warn};

use crate::codec::CacheValue;
use crate::connection::Connection;
use crate::discovery;
use crate::protocol::{StorageCommand, StorageReply};
use crate::ring::NodeRing;

/// Default bound on connecting to a node and on each round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of `gets`/`cas` rounds before a conditional write gives up.
pub const DEFAULT_CAS_ATTEMPTS: u32 = 5;

/// Connection settings shared by every node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemcachedConfig {
    pub timeout: Duration,
    /// Item expiry in seconds; `0` keeps items until evicted.
    pub expiry_secs: u32,
    pub cas_attempts: u32,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            expiry_secs: 0,
            cas_attempts: DEFAULT_CAS_ATTEMPTS,
        }
    }
}

/// Memcached-backed dedup store.
///
/// Opens a fresh connection per operation: the forwarder runs in short-lived
/// invocations that perform at most two round trips.
#[derive(Debug, Clone)]
pub struct MemcachedStore {
    ring: NodeRing,
    config: MemcachedConfig,
}

impl MemcachedStore {
    /// Creates a store over a static list of `host:port` nodes.
    pub fn new(nodes: impl IntoIterator<Item = String>, config: MemcachedConfig) -> Result<Self, StoreError> {
        let ring = NodeRing::new(nodes);
        if ring.is_empty() {
            return Err(StoreError::Discovery("no cache nodes configured".into()));
        }
        Ok(Self { ring, config })
    }

    /// Resolves the node list from an ElastiCache configuration endpoint.
    pub async fn discover(config_endpoint: &str, config: MemcachedConfig) -> Result<Self, StoreError> {
        let nodes = discovery::discover(config_endpoint, config.timeout).await?;
        Self::new(nodes, config)
    }

    /// Nodes keys are spread over.
    pub fn nodes(&self) -> &[String] {
        self.ring.nodes()
    }

    /// Reads and decodes the value under `key`.
    pub async fn get_value(&self, key: &str) -> Result<Option<CacheValue>, StoreError> {
        let mut conn = self.connect(key).await?;
        match conn.get(key).await? {
            Some(item) => CacheValue::decode(key, item.flags, item.data).map(Some),
            None => Ok(None),
        }
    }

    /// Encodes and stores `value` under `key`.
    pub async fn set_value(&self, key: &str, value: &CacheValue) -> Result<(), StoreError> {
        let (data, flags) = value.encode();
        let mut conn = self.connect(key).await?;
        let reply = conn
            .store(StorageCommand::Set, key, flags, self.config.expiry_secs, &data)
            .await?;
        match reply {
            StorageReply::Stored => Ok(()),
            other => Err(StoreError::Protocol(format!(
                "set of '{key}' answered {other:?}"
            ))),
        }
    }

    async fn connect(&self, key: &str) -> Result<Connection, StoreError> {
        let node = self
            .ring
            .node_for(key)
            .ok_or_else(|| StoreError::Discovery("no cache nodes configured".into()))?;
        Connection::connect(node, self.config.timeout).await
    }
}

#[async_trait]
impl DedupStore for MemcachedStore {
    #[instrument(skip_all, fields(key = %key))]
    async fn get(&self, key: &DedupKey) -> Result<Option<String>, StoreError> {
        let value = self.get_value(key.as_str()).await?;
        Ok(value.map(CacheValue::into_string))
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn set(&self, key: &DedupKey, value: &str) -> Result<(), StoreError> {
        self.set_value(key.as_str(), &CacheValue::from(value)).await
    }

    /// Atomic per key: `add` when the key is absent, `cas` against the unique
    /// read by `gets` otherwise. A lost race re-reads and tries again.
    #[instrument(skip_all, fields(key = %key))]
    async fn set_if_not_equal(&self, key: &DedupKey, value: &str) -> Result<bool, StoreError> {
        let key = key.as_str();
        let (data, flags) = CacheValue::from(value).encode();
        let exptime = self.config.expiry_secs;
        let mut conn = self.connect(key).await?;

        for attempt in 1..=self.config.cas_attempts {
            let command = match conn.gets(key).await? {
                None => StorageCommand::Add,
                Some(item) => {
                    let current = CacheValue::decode(key, item.flags, item.data)?.into_string();
                    if current == value {
                        return Ok(false);
                    }
                    let unique = item.cas.ok_or_else(|| {
                        StoreError::Protocol(format!("gets reply for '{key}' has no cas unique"))
                    })?;
                    StorageCommand::Cas(unique)
                }
            };

            match conn.store(command, key, flags, exptime, &data).await? {
                StorageReply::Stored => return Ok(true),
                lost => debug!(attempt, reply = ?lost, "Conditional write lost a race, re-reading"),
            }
        }

        warn!(attempts = self.config.cas_attempts, "Conditional write gave up");
        Err(StoreError::Contention {
            key: key.to_owned(),
            attempts: self.config.cas_attempts,
        })
    }
}
