//! Event record and the global event log.

use crate::error::Result;
use crate::types::{EventId, FeedRef, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A published payload, tagged with its feed and creation time.
///
/// Immutable once built. The payload is never inspected.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub feed: FeedRef,
    /// When the broker accepted the event (UTC).
    pub created: Timestamp,
    pub payload: serde_json::Value,
}

/// Exported shape of an event, without internal ids.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportedEvent<'a> {
    feed: &'a str,
    stamp: Timestamp,
    payload: &'a serde_json::Value,
}

impl Event {
    /// JSON encoding with the feed name, timestamp and payload.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&ExportedEvent {
            feed: &self.feed.name,
            stamp: self.created,
            payload: &self.payload,
        })?)
    }
}

/// Append-only record of every published event.
#[derive(Default)]
pub struct EventLog {
    entries: Mutex<Vec<Arc<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, event: Arc<Event>) {
        self.entries.lock().push(event);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
