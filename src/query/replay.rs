//! Updates waiting for a baseline
//!
//! Replaying a sequence of updates through [`merge`](crate::record::merge)
//! only depends, per id, on where that id first appeared and on its last
//! payload. The queue therefore keeps one slot per id, in first-arrival
//! order, holding the latest payload: replaying it yields the same
//! collection as replaying every message, and it never grows past the
//! number of distinct ids.

use std::collections::HashMap;

use crate::record::{Record, RecordId};

#[derive(Debug, Default)]
pub(crate) struct ReplayQueue {
    records: Vec<Record>,
    slots: HashMap<RecordId, usize>,
    messages: u64,
}

impl ReplayQueue {
    /// Queue an update. Returns true if it superseded a queued one.
    pub(crate) fn push(&mut self, record: Record) -> bool {
        self.messages += 1;
        match self.slots.get(&record.id) {
            Some(&slot) => {
                self.records[slot] = record;
                true
            }
            None => {
                self.slots.insert(record.id.clone(), self.records.len());
                self.records.push(record);
                false
            }
        }
    }

    /// Distinct ids queued
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Messages accepted since the last drain
    pub(crate) fn messages(&self) -> u64 {
        self.messages
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.slots.clear();
        self.messages = 0;
    }

    /// Take the queued updates in replay order
    pub(crate) fn drain(&mut self) -> Vec<Record> {
        self.slots.clear();
        self.messages = 0;
        std::mem::take(&mut self.records)
    }
}
