//! Fixed cluster membership and peer address resolution.

use std::collections::BTreeMap;

use anyhow::{Result, ensure};

/// Numeric identity of a cluster member (1..=5).
pub type NodeId = u64;

/// Number of members in the cluster. Membership is not dynamic.
pub const CLUSTER_SIZE: usize = 5;

/// Addresses of every cluster member, including the local node.
///
/// Addresses are base URLs such as `http://raft-server-3:5000`; endpoint paths
/// are appended to them by the peer client and by redirects.
#[derive(Debug, Clone)]
pub struct ClusterTopology {
    addresses: BTreeMap<NodeId, String>,
}

impl ClusterTopology {
    pub fn new(addresses: BTreeMap<NodeId, String>) -> Result<Self> {
        ensure!(
            addresses.len() == CLUSTER_SIZE,
            "topology requires exactly {CLUSTER_SIZE} nodes, got {}",
            addresses.len()
        );
        ensure!(
            addresses.keys().copied().eq(1..=CLUSTER_SIZE as NodeId),
            "node ids must be 1..={CLUSTER_SIZE}"
        );
        let addresses = addresses
            .into_iter()
            .map(|(id, addr)| (id, addr.trim_end_matches('/').to_string()))
            .collect();
        Ok(Self { addresses })
    }

    /// Builds the topology from the `{prefix}{id}:{port}` naming convention.
    pub fn from_convention(prefix: &str, port: u16) -> Self {
        let addresses = (1..=CLUSTER_SIZE as NodeId)
            .map(|id| (id, format!("{prefix}{id}:{port}")))
            .collect();
        Self { addresses }
    }

    /// Replaces the address of a single member.
    pub fn with_address(mut self, id: NodeId, address: impl Into<String>) -> Result<Self> {
        ensure!(self.addresses.contains_key(&id), "unknown node id {id}");
        let address = address.into();
        self.addresses
            .insert(id, address.trim_end_matches('/').to_string());
        Ok(self)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.addresses.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.addresses.keys().copied()
    }

    /// All members except `id`, in ascending id order.
    pub fn peers_of(&self, id: NodeId) -> Vec<NodeId> {
        self.ids().filter(|&peer| peer != id).collect()
    }

    pub fn address(&self, id: NodeId) -> Option<&str> {
        self.addresses.get(&id).map(String::as_str)
    }

    /// Address of a member without its port, e.g. `http://raft-server-3`.
    pub fn host(&self, id: NodeId) -> Option<&str> {
        self.address(id).map(|address| match address.rsplit_once(':') {
            Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
                host
            }
            _ => address,
        })
    }

    /// Strict majority of the membership.
    pub fn quorum(&self) -> usize {
        self.addresses.len() / 2 + 1
    }
}
