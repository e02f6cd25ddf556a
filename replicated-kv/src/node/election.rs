use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::Node;
use crate::error::KvError;
use crate::message::{VoteRequest, VoteResult};

impl Node {
    /// Receiver side of a vote request: one approval per term, ever.
    pub async fn receive_vote_request(&self, request: VoteRequest) -> Result<VoteResult, KvError> {
        let mut state = self.state.lock().await;
        state.membership.ensure_alive()?;
        if state
            .membership
            .grant_vote(request.term, request.candidate, Instant::now())
        {
            info!(
                node = self.id,
                term = request.term,
                candidate = request.candidate,
                "vote granted"
            );
            Ok(VoteResult::Approve)
        } else {
            debug!(
                node = self.id,
                term = request.term,
                candidate = request.candidate,
                voted_for = ?state.membership.vote_in(request.term),
                "vote refused"
            );
            Ok(VoteResult::Disapprove)
        }
    }

    /// Watches the heartbeat clock and campaigns when the leader goes quiet.
    pub(super) async fn run_election_monitor(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.config.timing.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            self.campaign_if_due().await;
        }
        debug!(node = self.id, "election monitor stopped");
    }

    /// Runs one election round if this node's election timeout has elapsed.
    ///
    /// Returns true when the round made this node leader.
    pub(crate) async fn campaign_if_due(&self) -> bool {
        let timeout = self.config.timing.election_timeout(self.id);
        let ballot = {
            let mut state = self.state.lock().await;
            if !state.membership.election_due(Instant::now(), timeout) {
                return false;
            }
            state.membership.begin_election()
        };
        info!(node = self.id, term = ballot.term, "leader silent, starting election");

        let request = VoteRequest {
            term: ballot.term,
            candidate: self.id,
        };
        let requests = self.peer_ids().into_iter().map(|peer| {
            let request = &request;
            async move { (peer, self.peers.request_vote(peer, request).await) }
        });

        let mut votes = usize::from(ballot.self_vote);
        for (peer, answer) in join_all(requests).await {
            match answer {
                Ok(VoteResult::Approve) => votes += 1,
                Ok(VoteResult::Disapprove) => {
                    debug!(node = self.id, peer, term = ballot.term, "peer disapproved")
                }
                Err(err) => debug!(
                    node = self.id,
                    peer,
                    term = ballot.term,
                    error = %format!("{err:#}"),
                    "no vote from peer"
                ),
            }
        }

        let quorum = self.config.topology.quorum();
        let (elected, term) = {
            let mut state = self.state.lock().await;
            let elected = state
                .membership
                .conclude_election(ballot, votes, quorum, Instant::now());
            (elected, state.membership.term())
        };

        if elected {
            info!(node = self.id, term, votes, "elected leader");
            self.heartbeat_now.notify_one();
        } else {
            info!(node = self.id, term, votes, quorum, "election failed");
        }
        elected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::Role;
    use crate::node::tests::isolated_node;

    #[tokio::test]
    async fn second_candidate_in_same_term_is_refused() {
        let node = isolated_node(1);
        let first = VoteRequest { term: 2, candidate: 3 };
        let second = VoteRequest { term: 2, candidate: 4 };

        assert_eq!(node.receive_vote_request(first).await, Ok(VoteResult::Approve));
        assert_eq!(node.receive_vote_request(second).await, Ok(VoteResult::Disapprove));
        assert_eq!(node.receive_vote_request(first).await, Ok(VoteResult::Disapprove));
    }

    #[tokio::test]
    async fn dead_node_does_not_vote() {
        let node = isolated_node(1);
        node.kill().await;
        let request = VoteRequest { term: 0, candidate: 2 };
        assert_eq!(node.receive_vote_request(request).await, Err(KvError::Unavailable));
    }

    #[tokio::test]
    async fn no_campaign_before_timeout() {
        let node = isolated_node(2);
        assert!(!node.campaign_if_due().await);
        assert_eq!(node.snapshot().await.term, 0);
    }

    #[tokio::test]
    async fn isolated_candidate_fails_and_advances_term() {
        let node = isolated_node(2);
        let timeout = node.config.timing.election_timeout(2);
        tokio::time::sleep(timeout + std::time::Duration::from_millis(20)).await;

        assert!(!node.campaign_if_due().await);
        let snapshot = node.snapshot().await;
        assert_eq!(snapshot.role, Role::Follower);
        assert_eq!(snapshot.leader, None);
        assert_eq!(snapshot.term, 1);
    }
}
