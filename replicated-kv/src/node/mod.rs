//! The node: a single coordination boundary around all replicated state.
//!
//! Role, term, leader, vote ledger, reachable set, event log and storage live
//! together in [`NodeState`] behind one async mutex. HTTP handlers and the two
//! background loops only touch them through methods on [`Node`], and never
//! hold the lock across a network call.
//!
//! The protocols are split by concern:
//!
//! - [`election`]: vote granting, the election monitor loop and rounds.
//! - [`heartbeat`]: the leader heartbeat loop and heartbeat acceptance.
//! - [`replication`]: client writes and their fan-out to followers.
//! - [`recovery`]: catch-up of a dead node and the responder side.

mod election;
mod heartbeat;
mod recovery;
mod replication;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::error::KvError;
use crate::event::{Event, EventLog};
use crate::membership::{Membership, choose_read_target};
use crate::message::{KeyValue, NodeSnapshot};
use crate::peer::PeerClient;
use crate::store::KvStore;
use crate::topology::NodeId;

pub use replication::WriteRequest;

/// Outcome of a client-facing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<T> {
    /// Handled locally.
    Done(T),
    /// The caller should repeat the request against this node.
    Redirect(NodeId),
}

impl<T> Reply<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        match self {
            Reply::Done(value) => Reply::Done(f(value)),
            Reply::Redirect(target) => Reply::Redirect(target),
        }
    }
}

/// Everything guarded by the node lock.
struct NodeState {
    membership: Membership,
    log: EventLog,
    store: KvStore,
}

impl NodeState {
    /// Appends to the log and applies to storage as one step.
    ///
    /// Events at or below the highest applied sequence are ignored, which
    /// makes duplicate deliveries harmless.
    fn apply(&mut self, event: Event) -> bool {
        let Some(position) = self.log.append(event) else {
            return false;
        };
        self.store.apply(&self.log.events()[position]);
        true
    }

    fn route_read(&self, key: &str) -> Result<Reply<KeyValue>, KvError> {
        self.membership.ensure_alive()?;
        if self.membership.is_leader() {
            if let Some(target) =
                choose_read_target(self.membership.reachable(), &mut rand::thread_rng())
            {
                return Ok(Reply::Redirect(target));
            }
        }
        let value = self.store.get(key)?.clone();
        Ok(Reply::Done(KeyValue {
            key: key.to_string(),
            value,
        }))
    }
}

pub struct Node {
    id: NodeId,
    config: NodeConfig,
    peers: PeerClient,
    state: Mutex<NodeState>,
    /// Serializes leader writes so followers receive events in order.
    write_gate: Mutex<()>,
    recovery_gate: Mutex<()>,
    /// Wakes the heartbeat loop right after winning an election.
    heartbeat_now: Notify,
    shutdown: watch::Sender<bool>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Result<Self> {
        let peers = PeerClient::new(config.topology.clone(), config.timing.rpc_timeout)?;
        let state = NodeState {
            membership: Membership::new(config.id, Instant::now()),
            log: EventLog::new(),
            store: KvStore::new(),
        };
        Ok(Self {
            id: config.id,
            config,
            peers,
            state: Mutex::new(state),
            write_gate: Mutex::new(()),
            recovery_gate: Mutex::new(()),
            heartbeat_now: Notify::new(),
            shutdown: watch::channel(false).0,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Base address of a cluster member, used to build redirects.
    pub fn address_of(&self, id: NodeId) -> Option<&str> {
        self.config.topology.address(id)
    }

    fn peer_ids(&self) -> Vec<NodeId> {
        self.config.topology.peers_of(self.id)
    }

    /// Reads a key from local storage, or sends a leader's reader elsewhere.
    ///
    /// Followers answer from their own storage, which may lag the leader.
    pub async fn get(&self, key: &str) -> Result<Reply<KeyValue>, KvError> {
        self.state.lock().await.route_read(key)
    }

    pub async fn create(&self, key: String, value: serde_json::Value) -> Result<Reply<Event>, KvError> {
        self.write(WriteRequest::Create { key, value }).await
    }

    pub async fn update(&self, key: String, value: serde_json::Value) -> Result<Reply<Event>, KvError> {
        self.write(WriteRequest::Update { key, value }).await
    }

    pub async fn delete(&self, key: String) -> Result<Reply<Event>, KvError> {
        self.write(WriteRequest::Delete { key }).await
    }

    /// Applies an event pushed by the leader. Returns false for duplicates.
    pub async fn apply_replicated(&self, event: Event) -> Result<bool, KvError> {
        let mut state = self.state.lock().await;
        state.membership.ensure_alive()?;
        let sequence = event.sequence;
        let applied = state.apply(event);
        if !applied {
            debug!(node = self.id, sequence, "ignoring already applied event");
        }
        Ok(applied)
    }

    /// Takes the node out of service until [`Node::recover`] runs.
    pub async fn kill(&self) {
        let mut state = self.state.lock().await;
        state.membership.mark_dead();
        info!(node = self.id, term = state.membership.term(), "node killed");
    }

    pub async fn snapshot(&self) -> NodeSnapshot {
        let state = self.state.lock().await;
        let leader = state.membership.leader();
        NodeSnapshot {
            master: leader
                .and_then(|id| self.config.topology.host(id))
                .map(str::to_string),
            leader_address: leader.and_then(|id| self.address_of(id)).map(str::to_string),
            leader,
            events: state.log.events().to_vec(),
            health: state.membership.health(),
            role: state.membership.role(),
            storage: state.store.snapshot(),
            node_id: self.id,
            term: state.membership.term(),
        }
    }

    /// Signals the background loops and any pending recovery to stop.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Receiver that observes a later call to [`Node::shutdown`].
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Starts the heartbeat sender and the election monitor.
    ///
    /// Both run until [`Node::shutdown`] is called. While the node is dead
    /// they keep ticking but do nothing.
    pub fn spawn_background(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(Arc::clone(self).run_heartbeat_loop(self.shutdown_signal())),
            tokio::spawn(Arc::clone(self).run_election_monitor(self.shutdown_signal())),
        ]
    }
}
