//! Per-node view of role, health, election term and leadership.
//!
//! [`Membership`] holds only plain data and synchronous transitions. The node
//! keeps it behind the same lock as the log and storage, so every field here
//! is always observed consistently with the others.

use std::collections::{BTreeMap, BTreeSet, btree_map::Entry};
use std::time::Duration;

use rand::{Rng, seq::IteratorRandom};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::KvError;
use crate::topology::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Leader,
    Follower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
    Alive,
    Dead,
}

/// Result of opening an election round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ballot {
    pub term: u64,
    /// False when the ledger already holds a vote for another candidate in
    /// this term; the candidate then campaigns without its own vote.
    pub self_vote: bool,
}

#[derive(Debug)]
pub struct Membership {
    id: NodeId,
    role: Role,
    health: Health,
    term: u64,
    leader: Option<NodeId>,
    last_heartbeat: Instant,
    /// term -> candidate. Written once per term, never overwritten.
    votes: BTreeMap<u64, NodeId>,
    /// Followers that answered the most recent heartbeat round.
    reachable: BTreeSet<NodeId>,
}

impl Membership {
    pub fn new(id: NodeId, now: Instant) -> Self {
        Self {
            id,
            role: Role::Follower,
            health: Health::Alive,
            term: 0,
            leader: None,
            last_heartbeat: now,
            votes: BTreeMap::new(),
            reachable: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn health(&self) -> Health {
        self.health
    }

    pub fn term(&self) -> u64 {
        self.term
    }

    pub fn leader(&self) -> Option<NodeId> {
        self.leader
    }

    pub fn reachable(&self) -> &BTreeSet<NodeId> {
        &self.reachable
    }

    pub fn vote_in(&self, term: u64) -> Option<NodeId> {
        self.votes.get(&term).copied()
    }

    pub fn is_alive(&self) -> bool {
        self.health == Health::Alive
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    /// Fails fast with `Unavailable` while the node is dead.
    pub fn ensure_alive(&self) -> Result<(), KvError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(KvError::Unavailable)
        }
    }

    pub fn become_leader(&mut self, term: u64, now: Instant) {
        self.role = Role::Leader;
        self.term = term;
        self.leader = Some(self.id);
        self.last_heartbeat = now;
    }

    pub fn become_follower(&mut self, term: u64, leader: Option<NodeId>) {
        self.role = Role::Follower;
        self.term = term;
        self.leader = leader;
        self.reachable.clear();
    }

    /// Forces the node out of service: it stops leading and forgets who leads.
    pub fn mark_dead(&mut self) {
        self.health = Health::Dead;
        self.role = Role::Follower;
        self.leader = None;
        self.reachable.clear();
    }

    /// Returns the node to service as a follower with a fresh heartbeat clock.
    pub fn mark_alive(&mut self, leader: Option<NodeId>, term: u64, now: Instant) {
        self.health = Health::Alive;
        let term = self.term.max(term);
        self.become_follower(term, leader);
        self.last_heartbeat = now;
    }

    /// Handles a leader heartbeat.
    ///
    /// A heartbeat carrying a term lower than ours comes from a stale leader
    /// and is refused; anything else makes us a follower of the sender.
    pub fn accept_heartbeat(
        &mut self,
        leader: NodeId,
        term: u64,
        now: Instant,
    ) -> Result<(), KvError> {
        if term < self.term {
            return Err(KvError::Forbidden(format!(
                "heartbeat term {term} is behind local term {}",
                self.term
            )));
        }
        self.become_follower(term, Some(leader));
        self.last_heartbeat = now;
        Ok(())
    }

    /// Leader-side refresh after a heartbeat round.
    pub fn record_heartbeat_round(&mut self, reachable: BTreeSet<NodeId>, now: Instant) {
        self.leader = Some(self.id);
        self.reachable = reachable;
        self.last_heartbeat = now;
    }

    /// Votes for `candidate` unless a vote was already cast in `term`.
    ///
    /// Granting a vote also drops trust in the current leader and restarts
    /// the election clock so voters do not immediately compete. A leader
    /// keeps naming itself until a heartbeat demotes it.
    pub fn grant_vote(&mut self, term: u64, candidate: NodeId, now: Instant) -> bool {
        match self.votes.entry(term) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(candidate);
                if self.role != Role::Leader {
                    self.leader = None;
                }
                self.last_heartbeat = now;
                true
            }
        }
    }

    pub fn election_due(&self, now: Instant, timeout: Duration) -> bool {
        self.is_alive()
            && self.role == Role::Follower
            && now.saturating_duration_since(self.last_heartbeat) > timeout
    }

    /// Opens an election in the current term and casts the self vote.
    pub fn begin_election(&mut self) -> Ballot {
        self.leader = None;
        let self_vote = match self.votes.entry(self.term) {
            Entry::Vacant(slot) => {
                slot.insert(self.id);
                true
            }
            Entry::Occupied(slot) => *slot.get() == self.id,
        };
        Ballot {
            term: self.term,
            self_vote,
        }
    }

    /// Closes an election round and advances the term.
    ///
    /// Leadership is only taken if the node is still an alive follower in
    /// the election term; a heartbeat or kill during the round wins. The term
    /// always moves past the election term, whatever the outcome.
    pub fn conclude_election(
        &mut self,
        ballot: Ballot,
        votes: usize,
        quorum: usize,
        now: Instant,
    ) -> bool {
        let undisturbed =
            self.is_alive() && self.role == Role::Follower && self.term == ballot.term;
        let next_term = self.term.max(ballot.term + 1);
        if undisturbed && votes >= quorum {
            self.become_leader(next_term, now);
            true
        } else {
            self.term = next_term;
            false
        }
    }
}

/// Picks a random follower from the reachable set to serve a read.
pub fn choose_read_target<R: Rng + ?Sized>(
    reachable: &BTreeSet<NodeId>,
    rng: &mut R,
) -> Option<NodeId> {
    reachable.iter().copied().choose(rng)
}
