//! Launching a node: HTTP server plus background loops, with one shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::NodeConfig;
use crate::node::Node;
use crate::server;

/// A running node and the tasks that drive it.
pub struct NodeHandle {
    node: Arc<Node>,
    local_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the server, both loops and any pending recovery, then waits
    /// for them to finish.
    pub async fn shutdown(self) -> Result<()> {
        self.node.shutdown();
        for task in self.tasks {
            task.await.map_err(|err| anyhow!("node task panicked: {err}"))?;
        }
        Ok(())
    }
}

/// Starts serving `config` on an already bound listener.
///
/// Must be called from within a Tokio runtime.
pub fn launch(listener: TcpListener, config: NodeConfig) -> Result<NodeHandle> {
    let local_addr = listener
        .local_addr()
        .context("listener has no local address")?;
    let node = Arc::new(Node::new(config)?);
    let mut tasks = node.spawn_background();

    let mut server_shutdown = node.shutdown_signal();
    let server_node = Arc::clone(&node);
    tasks.push(tokio::spawn(async move {
        let shutdown = async move {
            let _ = server_shutdown.changed().await;
        };
        if let Err(err) = server::serve(listener, server_node, shutdown).await {
            warn!(error = ?err, "http server exited with error");
        }
    }));

    Ok(NodeHandle {
        node,
        local_addr,
        tasks,
    })
}
