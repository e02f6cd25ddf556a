//! Replicated key-value store for a fixed cluster of five nodes.
//!
//! Clients may talk to any node. Writes are funneled to a single elected
//! leader, which orders them into an event log and pushes every event to the
//! followers before answering. Reads are served from a follower's local
//! storage. Nodes can be killed and recovered administratively; a recovering
//! node pulls the log suffix it missed from a peer and rediscovers the leader.
//!
//! Each module focuses on a concrete responsibility:
//!
//! - [`topology`] fixes the five members and resolves their addresses.
//! - [`config`] and [`cli`] turn flags and environment into a [`config::NodeConfig`].
//! - [`event`] defines events and the append-only log.
//! - [`store`] is the key-value state machine fed by the log.
//! - [`membership`] tracks role, health, term, leader and the vote ledger.
//! - [`message`] holds the JSON bodies exchanged over HTTP.
//! - [`peer`] makes bounded calls to other nodes.
//! - [`node`] guards all of the above behind one lock and runs the election,
//!   heartbeat, replication and recovery protocols.
//! - [`server`] exposes the node over HTTP with axum.
//! - [`runtime`] wires server and background loops together.

pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod membership;
pub mod message;
pub mod node;
pub mod peer;
pub mod runtime;
pub mod server;
pub mod store;
pub mod topology;
