//! Memcached dedup store adapter.
//!
//! Implements the [`forwarder::DedupStore`] trait over the memcached text
//! protocol, spreading keys across a cluster by rendezvous hashing. The node
//! list is either configured statically or discovered from an ElastiCache
//! configuration endpoint.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Protocol framing, connection handling, node discovery,
//! and value serialisation live here. The [`forwarder`] crate sees only
//! [`forwarder::DedupStore`].

pub mod codec;
pub mod connection;
pub mod discovery;
pub mod protocol;
pub mod ring;
pub mod store;

pub use codec::{CacheValue, FLAG_JSON, FLAG_TEXT};
pub use discovery::{discover, parse_cluster_config, ClusterConfig, ClusterNode};
pub use ring::NodeRing;
pub use store::{MemcachedConfig, MemcachedStore, DEFAULT_CAS_ATTEMPTS, DEFAULT_TIMEOUT};
