//! Key-to-node assignment by rendezvous (highest random weight) hashing.
//!
//! Every replica computes the same assignment from the same node list, and
//! removing a node only moves the keys that lived on it.

/// 64-bit FNV-1a followed by the MurmurHash3 finaliser, so that inputs
/// differing in a single byte still land far apart.
fn weight(parts: &[&[u8]]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for part in parts {
        for byte in *part {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(PRIME);
        }
    }
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xff51_afd7_ed55_8ccd);
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    hash ^ (hash >> 33)
}

/// The set of nodes keys are spread over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRing {
    nodes: Vec<String>,
}

impl NodeRing {
    /// Builds a ring from `host:port` node names. Duplicates are dropped.
    pub fn new(nodes: impl IntoIterator<Item = String>) -> Self {
        let mut nodes: Vec<String> = nodes.into_iter().collect();
        nodes.sort();
        nodes.dedup();
        Self { nodes }
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node owning `key`, or `None` for an empty ring.
    pub fn node_for(&self, key: &str) -> Option<&str> {
        self.nodes
            .iter()
            .max_by_key(|node| weight(&[node.as_bytes(), b"-", key.as_bytes()]))
            .map(String::as_str)
    }
}
