//! JSON bodies exchanged with clients and between nodes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::Event;
use crate::membership::{Health, Role};
use crate::topology::NodeId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateValue {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateValue {
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub result: String,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            result: "ok".to_string(),
        }
    }
}

/// Answer to a replicated event delivered through a mirror endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorAck {
    pub result: String,
    /// False when the event had already been applied.
    pub applied: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub term: u64,
    pub candidate: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteResult {
    Approve,
    Disapprove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub result: VoteResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub leader: NodeId,
    pub term: u64,
}

/// Log suffix handed to a recovering node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchUp {
    pub events: Vec<Event>,
    pub leader: Option<NodeId>,
    #[serde(default)]
    pub term: u64,
}

/// Diagnostic view served by `GET /state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Known leader without its port, `{prefix}{id}` under the naming
    /// convention. Clients append the port themselves.
    pub master: Option<String>,
    /// Full base address of the known leader, as used for redirects.
    #[serde(default)]
    pub leader_address: Option<String>,
    pub leader: Option<NodeId>,
    pub events: Vec<Event>,
    pub health: Health,
    pub role: Role,
    pub storage: BTreeMap<String, Value>,
    pub node_id: NodeId,
    pub term: u64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn vote_response_uses_lowercase_results() {
        let approve = VoteResponse {
            result: VoteResult::Approve,
        };
        assert_eq!(serde_json::to_value(approve).unwrap(), json!({"result": "approve"}));
        let parsed: VoteResponse =
            serde_json::from_value(json!({"result": "disapprove"})).unwrap();
        assert_eq!(parsed.result, VoteResult::Disapprove);
    }

    #[test]
    fn catch_up_term_defaults_when_missing() {
        let parsed: CatchUp = serde_json::from_value(json!({"events": [], "leader": 2})).unwrap();
        assert_eq!(parsed.leader, Some(2));
        assert_eq!(parsed.term, 0);
    }

    #[test]
    fn snapshot_renders_roles_and_health_in_caps() {
        let snapshot = NodeSnapshot {
            master: None,
            leader_address: None,
            leader: None,
            events: vec![],
            health: Health::Dead,
            role: Role::Follower,
            storage: BTreeMap::new(),
            node_id: 4,
            term: 2,
        };
        let encoded = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(encoded["health"], json!("DEAD"));
        assert_eq!(encoded["role"], json!("FOLLOWER"));
        assert_eq!(encoded["master"], Value::Null);
    }
}
