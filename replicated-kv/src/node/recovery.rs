use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use super::Node;
use crate::error::KvError;
use crate::message::CatchUp;
use crate::topology::NodeId;

impl Node {
    /// Brings a dead node back: pulls the missing log suffix from the first
    /// authoritative peer, adopts its leader and rejoins as a follower.
    ///
    /// Blocks until some peer answers, polling all peers once per backoff.
    /// Calling it on an alive node does nothing. Gives up with `Unavailable`
    /// once the node is shutting down.
    pub async fn recover(&self) -> Result<(), KvError> {
        let mut shutdown = self.shutdown_signal();
        let _gate = self.recovery_gate.lock().await;
        if self.state.lock().await.membership.is_alive() {
            debug!(node = self.id, "recovery requested on alive node");
            return Ok(());
        }

        let backoff = self.config.timing.recovery_backoff();
        let mut rounds = 0u64;
        loop {
            rounds += 1;
            let from = self.state.lock().await.log.next_sequence();
            for peer in self.peer_ids() {
                match self.peers.catch_up(peer, from).await {
                    Ok(catch_up) => {
                        self.rejoin(peer, catch_up).await;
                        return Ok(());
                    }
                    Err(err) => debug!(
                        node = self.id,
                        peer,
                        from,
                        error = %format!("{err:#}"),
                        "peer cannot serve catch-up"
                    ),
                }
            }
            warn!(node = self.id, rounds, "no peer served catch-up, retrying");
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = time::sleep(backoff) => {}
            }
        }
        info!(node = self.id, rounds, "recovery abandoned on shutdown");
        Err(KvError::Unavailable)
    }

    async fn rejoin(&self, source: NodeId, catch_up: CatchUp) {
        let mut state = self.state.lock().await;
        let received = catch_up.events.len();
        let applied = catch_up
            .events
            .into_iter()
            .map(|event| state.apply(event))
            .filter(|applied| *applied)
            .count();
        state
            .membership
            .mark_alive(catch_up.leader, catch_up.term, Instant::now());
        info!(
            node = self.id,
            source,
            received,
            applied,
            last_sequence = state.log.last_sequence(),
            leader = ?catch_up.leader,
            term = state.membership.term(),
            "recovered"
        );
    }

    /// Responder side of catch-up: every event with sequence `from` or later.
    ///
    /// Only the leader, or a node that knows no leader, may answer. A
    /// follower with a known leader could hand out an incomplete log.
    pub async fn catch_up_from(&self, from: u64) -> Result<CatchUp, KvError> {
        let state = self.state.lock().await;
        state.membership.ensure_alive()?;
        if !state.membership.is_leader() {
            if let Some(leader) = state.membership.leader() {
                return Err(KvError::Forbidden(format!(
                    "node {} follows node {leader}",
                    self.id
                )));
            }
        }
        Ok(CatchUp {
            events: state.log.slice_after(from.saturating_sub(1)).to_vec(),
            leader: state.membership.leader(),
            term: state.membership.term(),
        })
    }
}
