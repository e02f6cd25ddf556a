use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::{NodeConfig, Timing};
use crate::topology::{ClusterTopology, NodeId};

/// Run one member of the five-node replicated key-value store.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Numeric id of this node (1..=5).
    #[arg(long, env = "SERVER_ID")]
    pub id: NodeId,

    /// Port the HTTP server listens on.
    #[arg(long, env = "SERVER_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Address the HTTP server binds to.
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Prefix of the peer naming convention; node N lives at `{prefix}N:{peer-port}`.
    #[arg(long, env = "PEER_PREFIX", default_value = "http://raft-server-")]
    pub peer_prefix: String,

    /// Port peers listen on. Defaults to `--port`.
    #[arg(long, env = "PEER_PORT")]
    pub peer_port: Option<u16>,

    /// Explicit peer addresses overriding the convention: id=url,id=url,...
    #[arg(long = "peer", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Heartbeat interval in milliseconds.
    #[arg(long, env = "HEARTBEAT_MS", default_value_t = 1000)]
    pub heartbeat_ms: u64,

    /// Per-node-id election stagger in milliseconds.
    #[arg(long, env = "ELECTION_JITTER_MS", default_value_t = 1000)]
    pub jitter_ms: u64,

    /// Timeout for a single call to a peer in milliseconds.
    #[arg(long, env = "RPC_TIMEOUT_MS", default_value_t = 1000)]
    pub rpc_timeout_ms: u64,
}

impl Cli {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn node_config(&self) -> Result<NodeConfig> {
        let mut topology =
            ClusterTopology::from_convention(&self.peer_prefix, self.peer_port.unwrap_or(self.port));
        for (id, address) in parse_peers(&self.peers)? {
            topology = topology.with_address(id, address)?;
        }
        let timing = Timing {
            heartbeat_interval: Duration::from_millis(self.heartbeat_ms),
            election_jitter: Duration::from_millis(self.jitter_ms),
            rpc_timeout: Duration::from_millis(self.rpc_timeout_ms),
        };
        NodeConfig::new(self.id, topology, timing)
    }
}

fn parse_peers(entries: &[String]) -> Result<Vec<(NodeId, String)>> {
    entries
        .iter()
        .map(|entry| -> Result<(NodeId, String)> {
            let Some((id, address)) = entry.split_once('=') else {
                anyhow::bail!("invalid peer entry '{entry}', expected id=url");
            };
            let id: NodeId = id
                .trim()
                .parse()
                .with_context(|| format!("invalid peer id in '{entry}'"))?;
            Ok((id, address.trim().to_string()))
        })
        .collect()
}
