use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info};

use super::{Node, Reply};
use crate::error::KvError;
use crate::event::Event;

/// A client write before it is turned into an event.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Create { key: String, value: Value },
    Update { key: String, value: Value },
    Delete { key: String },
}

impl Node {
    /// Orders a client write into the log and pushes it to every follower.
    ///
    /// Only the leader accepts writes: other nodes redirect to the leader they
    /// know, or report `Locked` when they know none. The reply is sent after
    /// every peer has answered or timed out; dead peers are not waited for
    /// and catch up through recovery.
    pub(crate) async fn write(&self, request: WriteRequest) -> Result<Reply<Event>, KvError> {
        let _gate = self.write_gate.lock().await;

        let event = {
            let mut state = self.state.lock().await;
            state.membership.ensure_alive()?;
            if !state.membership.is_leader() {
                return match state.membership.leader() {
                    Some(leader) => Ok(Reply::Redirect(leader)),
                    None => Err(KvError::Locked),
                };
            }

            let sequence = state.log.next_sequence();
            let event = match request {
                WriteRequest::Create { key, value } => {
                    state.store.ensure_absent(&key)?;
                    Event::create(sequence, key, value)
                }
                WriteRequest::Update { key, value } => {
                    state.store.ensure_present(&key)?;
                    Event::update(sequence, key, value)
                }
                WriteRequest::Delete { key } => {
                    state.store.ensure_present(&key)?;
                    Event::delete(sequence, key)
                }
            };
            state.apply(event.clone());
            event
        };

        self.replicate(&event).await;
        Ok(Reply::Done(event))
    }

    /// Sends `event` to all peers concurrently and waits for every answer.
    async fn replicate(&self, event: &Event) {
        let deliveries = self.peer_ids().into_iter().map(|peer| async move {
            (peer, self.peers.replicate(peer, event).await)
        });

        let mut acknowledged = 0;
        for (peer, outcome) in join_all(deliveries).await {
            match outcome {
                Ok(_) => acknowledged += 1,
                Err(err) => debug!(
                    node = self.id,
                    peer,
                    sequence = event.sequence,
                    error = %format!("{err:#}"),
                    "peer missed replicated event"
                ),
            }
        }

        info!(
            node = self.id,
            sequence = event.sequence,
            kind = ?event.kind,
            key = %event.key,
            acknowledged,
            "event committed"
        );
    }
}
