//! In-memory key-value storage driven by the event log.
//!
//! Storage is a derived cache of the log. The only mutation entry point is
//! [`KvStore::apply`]; client-facing validation (create on an existing key,
//! update or delete on a missing key) happens through the `ensure_*` checks
//! before an event is ever produced.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::KvError;
use crate::event::{Event, EventKind};

/// Key-value state machine owned by a single node.
///
/// `BTreeMap` keeps iteration deterministic, so `/state` output and replay
/// comparisons between nodes are stable.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct KvStore {
    data: BTreeMap<String, Value>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds storage by applying events in order from empty state.
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut store = Self::new();
        for event in events {
            store.apply(event);
        }
        store
    }

    /// Mutates storage according to the event kind.
    ///
    /// Replicated events have already been validated by the leader, so an
    /// update of a missing key inserts it and a delete of a missing key is a
    /// no-op rather than an error.
    pub fn apply(&mut self, event: &Event) {
        match event.kind {
            EventKind::Create | EventKind::Update => {
                let value = event.value.clone().unwrap_or(Value::Null);
                self.data.insert(event.key.clone(), value);
            }
            EventKind::Delete => {
                self.data.remove(&event.key);
            }
        }
    }

    pub fn get(&self, key: &str) -> Result<&Value, KvError> {
        self.data
            .get(key)
            .ok_or_else(|| KvError::NotFound(key.to_string()))
    }

    pub fn ensure_absent(&self, key: &str) -> Result<(), KvError> {
        if self.data.contains_key(key) {
            return Err(KvError::AlreadyExists(key.to_string()));
        }
        Ok(())
    }

    pub fn ensure_present(&self, key: &str) -> Result<(), KvError> {
        self.get(key).map(|_| ())
    }

    /// Clones the current contents for diagnostics.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
