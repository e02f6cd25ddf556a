use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::Node;
use crate::error::KvError;
use crate::message::Heartbeat;
use crate::topology::NodeId;

impl Node {
    /// Follower side: yield to any leader whose term is not behind ours.
    pub async fn receive_heartbeat(&self, heartbeat: Heartbeat) -> Result<(), KvError> {
        let mut state = self.state.lock().await;
        state.membership.ensure_alive()?;

        let was_leader = state.membership.is_leader();
        let previous = state.membership.leader();
        if let Err(err) = state
            .membership
            .accept_heartbeat(heartbeat.leader, heartbeat.term, Instant::now())
        {
            warn!(
                node = self.id,
                leader = heartbeat.leader,
                term = heartbeat.term,
                local_term = state.membership.term(),
                "rejected heartbeat from stale leader"
            );
            return Err(err);
        }

        if was_leader {
            info!(node = self.id, leader = heartbeat.leader, term = heartbeat.term, "stepped down");
        } else if previous != Some(heartbeat.leader) {
            info!(node = self.id, leader = heartbeat.leader, term = heartbeat.term, "following leader");
        }
        Ok(())
    }

    pub(super) async fn run_heartbeat_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.config.timing.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
                _ = self.heartbeat_now.notified() => {}
            }
            self.heartbeat_round().await;
        }
        debug!(node = self.id, "heartbeat loop stopped");
    }

    /// Broadcasts one heartbeat and rebuilds the reachable set from scratch.
    ///
    /// Returns the followers that answered, or `None` when this node is not
    /// an alive leader.
    pub(crate) async fn heartbeat_round(&self) -> Option<BTreeSet<NodeId>> {
        let heartbeat = {
            let state = self.state.lock().await;
            if !(state.membership.is_alive() && state.membership.is_leader()) {
                return None;
            }
            Heartbeat {
                leader: self.id,
                term: state.membership.term(),
            }
        };

        let pings = self.peer_ids().into_iter().map(|peer| {
            let heartbeat = &heartbeat;
            async move { (peer, self.peers.heartbeat(peer, heartbeat).await) }
        });

        let mut reachable = BTreeSet::new();
        for (peer, outcome) in join_all(pings).await {
            match outcome {
                Ok(()) => {
                    reachable.insert(peer);
                }
                Err(err) => debug!(
                    node = self.id,
                    peer,
                    error = %format!("{err:#}"),
                    "follower unreachable this round"
                ),
            }
        }

        let mut state = self.state.lock().await;
        // A kill, step-down or newer term during the round voids its result.
        if state.membership.is_alive()
            && state.membership.is_leader()
            && state.membership.term() == heartbeat.term
        {
            state
                .membership
                .record_heartbeat_round(reachable.clone(), Instant::now());
        }
        Some(reachable)
    }
}
