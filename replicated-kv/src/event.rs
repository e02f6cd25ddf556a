//! Events and the ordered event log.
//!
//! The log is the source of truth for every node: storage is only ever
//! mutated by applying events taken from it, so replaying a log from empty
//! state reproduces the storage contents exactly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

/// A single ordered state mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub sequence: u64,
    pub kind: EventKind,
    pub key: String,
    #[serde(default)]
    pub value: Option<Value>,
}

impl Event {
    pub fn create(sequence: u64, key: impl Into<String>, value: Value) -> Self {
        Self {
            sequence,
            kind: EventKind::Create,
            key: key.into(),
            value: Some(value),
        }
    }

    pub fn update(sequence: u64, key: impl Into<String>, value: Value) -> Self {
        Self {
            sequence,
            kind: EventKind::Update,
            key: key.into(),
            value: Some(value),
        }
    }

    pub fn delete(sequence: u64, key: impl Into<String>) -> Self {
        Self {
            sequence,
            kind: EventKind::Delete,
            key: key.into(),
            value: None,
        }
    }
}

/// Append-only sequence of events with strictly increasing sequence numbers.
///
/// Sequence numbers need not be contiguous: a follower that missed a
/// delivery keeps a gap until it recovers.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<Event>,
    last_sequence: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest sequence number observed so far (0 when empty).
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Sequence number the leader hands out for its next event.
    pub fn next_sequence(&self) -> u64 {
        self.last_sequence + 1
    }

    /// Whether an event with this sequence has already been applied.
    pub fn contains(&self, sequence: u64) -> bool {
        sequence <= self.last_sequence
    }

    /// Appends an event and returns its position in the log.
    ///
    /// Returns `None` without touching the log when the sequence is not
    /// beyond the current maximum; duplicates and stale deliveries are
    /// dropped here.
    pub fn append(&mut self, event: Event) -> Option<usize> {
        if self.contains(event.sequence) {
            return None;
        }
        self.last_sequence = event.sequence;
        self.events.push(event);
        Some(self.events.len() - 1)
    }

    /// Every event with a sequence strictly greater than `after`, in order.
    pub fn slice_after(&self, after: u64) -> &[Event] {
        let start = self.events.partition_point(|event| event.sequence <= after);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn log_with(sequences: &[u64]) -> EventLog {
        let mut log = EventLog::new();
        for &sequence in sequences {
            log.append(Event::create(sequence, format!("k{sequence}"), json!(sequence)));
        }
        log
    }

    #[test]
    fn append_returns_positions_and_tracks_maximum() {
        let mut log = EventLog::new();
        assert_eq!(log.next_sequence(), 1);
        assert_eq!(log.append(Event::create(1, "a", json!(1))), Some(0));
        assert_eq!(log.append(Event::update(2, "a", json!(2))), Some(1));
        assert_eq!(log.last_sequence(), 2);
        assert_eq!(log.next_sequence(), 3);
    }

    #[test]
    fn duplicate_and_stale_sequences_are_dropped() {
        let mut log = log_with(&[1, 2, 3]);
        assert_eq!(log.append(Event::delete(3, "k3")), None);
        assert_eq!(log.append(Event::delete(1, "k1")), None);
        assert_eq!(log.len(), 3);
        assert_eq!(log.last_sequence(), 3);
    }

    #[test]
    fn slice_after_returns_strict_suffix() {
        let log = log_with(&[1, 2, 3, 4]);
        let sequences = |after| {
            log.slice_after(after)
                .iter()
                .map(|event| event.sequence)
                .collect::<Vec<_>>()
        };
        assert_eq!(sequences(0), vec![1, 2, 3, 4]);
        assert_eq!(sequences(2), vec![3, 4]);
        assert_eq!(sequences(4), Vec::<u64>::new());
        assert_eq!(sequences(10), Vec::<u64>::new());
    }

    #[test]
    fn slice_after_handles_gaps() {
        let log = log_with(&[1, 2, 5, 7]);
        let suffix: Vec<_> = log.slice_after(3).iter().map(|e| e.sequence).collect();
        assert_eq!(suffix, vec![5, 7]);
    }

    #[test]
    fn event_wire_format() {
        let event = Event::delete(7, "gone");
        let encoded = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            encoded,
            json!({"sequence": 7, "kind": "DELETE", "key": "gone", "value": null})
        );

        let decoded: Event =
            serde_json::from_value(json!({"sequence": 3, "kind": "CREATE", "key": "k", "value": [1, 2]}))
                .expect("deserialize");
        assert_eq!(decoded, Event::create(3, "k", json!([1, 2])));
    }
}
