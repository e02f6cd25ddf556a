use std::time::Duration;

use anyhow::{Result, ensure};

use crate::topology::{ClusterTopology, NodeId};

/// Protocol timing, all derived from the heartbeat interval `H`.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Period of the leader heartbeat and of the follower election check.
    pub heartbeat_interval: Duration,
    /// Extra election timeout per unit of node id, staggering candidates.
    pub election_jitter: Duration,
    /// Upper bound on any single outbound call to a peer.
    pub rpc_timeout: Duration,
}

impl Timing {
    /// A follower starts an election after `3 * H + id * jitter` of silence.
    pub fn election_timeout(&self, id: NodeId) -> Duration {
        self.heartbeat_interval * 3 + self.election_jitter * id as u32
    }

    /// Pause between full recovery rounds over all peers.
    pub fn recovery_backoff(&self) -> Duration {
        self.heartbeat_interval
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            election_jitter: Duration::from_secs(1),
            rpc_timeout: Duration::from_secs(1),
        }
    }
}

/// Identity and surroundings of one cluster member.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub id: NodeId,
    pub topology: ClusterTopology,
    pub timing: Timing,
}

impl NodeConfig {
    pub fn new(id: NodeId, topology: ClusterTopology, timing: Timing) -> Result<Self> {
        ensure!(topology.contains(id), "node id {id} is not a cluster member");
        ensure!(
            !timing.heartbeat_interval.is_zero(),
            "heartbeat interval must be positive"
        );
        Ok(Self {
            id,
            topology,
            timing,
        })
    }
}
