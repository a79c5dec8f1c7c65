//! ElastiCache auto-discovery.
//!
//! A memcached cluster exposes a configuration endpoint that answers
//! `config get cluster` with the current node list:
//!
//! ```text
//! CONFIG cluster 0 <len>\r\n
//! <config version>\n
//! <hostname>|<ip>|<port> <hostname>|<ip>|<port> ...\n
//! \r\n
//! END\r\n
//! ```

use std::time::Duration;

use forwarder::StoreError;
use tracing::info;

use crate::connection::Connection;

/// One node listed in the cluster configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNode {
    pub hostname: String,
    pub ip: String,
    pub port: u16,
}

impl ClusterNode {
    /// `ip:port`, or `hostname:port` when the node has no private ip listed.
    pub fn address(&self) -> String {
        let host = if self.ip.is_empty() {
            &self.hostname
        } else {
            &self.ip
        };
        format!("{host}:{}", self.port)
    }
}

/// Parsed cluster configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Incremented by the service each time membership changes.
    pub version: u64,
    pub nodes: Vec<ClusterNode>,
}

/// Parses the body of a `config get cluster` reply.
pub fn parse_cluster_config(body: &str) -> Result<ClusterConfig, StoreError> {
    let mut lines = body.lines().map(str::trim).filter(|l| !l.is_empty());
    let version = lines
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| StoreError::Discovery(format!("missing config version in '{body}'")))?;
    let nodes = lines
        .next()
        .ok_or_else(|| StoreError::Discovery("cluster config lists no nodes".into()))?
        .split_whitespace()
        .map(parse_node)
        .collect::<Result<Vec<_>, _>>()?;
    if nodes.is_empty() {
        return Err(StoreError::Discovery("cluster config lists no nodes".into()));
    }
    Ok(ClusterConfig { version, nodes })
}

fn parse_node(entry: &str) -> Result<ClusterNode, StoreError> {
    let bad = || StoreError::Discovery(format!("malformed node entry '{entry}'"));
    let mut fields = entry.split('|');
    let hostname = fields.next().ok_or_else(bad)?.to_owned();
    let ip = fields.next().ok_or_else(bad)?.to_owned();
    let port = fields.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    if fields.next().is_some() || (hostname.is_empty() && ip.is_empty()) {
        return Err(bad());
    }
    Ok(ClusterNode { hostname, ip, port })
}

/// Asks the configuration endpoint for the cluster's node addresses.
pub async fn discover(config_endpoint: &str, timeout: Duration) -> Result<Vec<String>, StoreError> {
    let mut conn = Connection::connect(config_endpoint, timeout).await?;
    let body = conn.config_get_cluster().await?;
    let config = parse_cluster_config(&body)?;
    let addresses: Vec<String> = config.nodes.iter().map(ClusterNode::address).collect();
    info!(
        config_endpoint,
        version = config.version,
        nodes = ?addresses,
        "Discovered cache cluster nodes"
    );
    Ok(addresses)
}
