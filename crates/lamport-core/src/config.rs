//! Cluster configuration.
//!
//! The cluster is described by a JSON object mapping every node id to the
//! address it listens on:
//!
//! ```json
//! { "1": "http://127.0.0.1:8001", "2": "127.0.0.1:8002", "3": "node-3:8003" }
//! ```
//!
//! Addresses are `host:port`, optionally with an `http://` prefix and a
//! trailing `/`. Each node loads the same file and takes its own entry as its
//! listen address and every other entry as its peer directory.

use std::{collections::BTreeMap, path::Path};

use lamport_proto::NodeId;

use crate::error::ConfigError;

/// Static mapping from peer id to transport address, excluding the local
/// node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerDirectory {
    peers: BTreeMap<NodeId, String>,
}

impl PeerDirectory {
    /// Directory from `(id, address)` pairs.
    pub fn new(peers: impl IntoIterator<Item = (NodeId, String)>) -> Self {
        Self { peers: peers.into_iter().collect() }
    }

    /// Address of `peer`.
    pub fn address(&self, peer: NodeId) -> Option<&str> {
        self.peers.get(&peer).map(String::as_str)
    }

    /// Peer ids in order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.peers.keys().copied()
    }

    /// Number of peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether there are no peers.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Every node of the cluster and its address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    nodes: BTreeMap<NodeId, String>,
}

impl ClusterConfig {
    /// Build from already-validated `(id, host:port)` pairs.
    pub fn new(nodes: impl IntoIterator<Item = (NodeId, String)>) -> Self {
        Self { nodes: nodes.into_iter().collect() }
    }

    /// Parse the JSON representation.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: BTreeMap<String, String> = serde_json::from_str(json)?;

        let mut nodes = BTreeMap::new();
        for (key, value) in raw {
            let node: NodeId =
                key.parse().map_err(|_| ConfigError::InvalidNodeId(key.clone()))?;
            let address = normalize_address(&value)
                .ok_or_else(|| ConfigError::InvalidAddress { node, address: value.clone() })?;
            nodes.insert(node, address);
        }

        Ok(Self { nodes })
    }

    /// Read and parse a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Listen address of `node` and the directory of everyone else.
    pub fn directory_for(&self, node: NodeId) -> Result<(String, PeerDirectory), ConfigError> {
        let listen = self.nodes.get(&node).ok_or(ConfigError::UnknownNode(node))?.clone();
        let peers = self
            .nodes
            .iter()
            .filter(|(id, _)| **id != node)
            .map(|(id, address)| (*id, address.clone()));
        Ok((listen, PeerDirectory::new(peers)))
    }

    /// Every node id.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }
}

/// Strip an `http://` prefix and trailing `/`, then require `host:port`.
fn normalize_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_scheme = trimmed.strip_prefix("http://").unwrap_or(trimmed);
    let address = without_scheme.trim_end_matches('/');

    let (host, port) = address.rsplit_once(':')?;
    if host.is_empty() || host.contains('/') {
        return None;
    }
    port.parse::<u16>().ok()?;

    Some(address.to_string())
}
