//! Merge rule for push updates

use std::collections::HashSet;

use super::message::InboundMessage;
use super::model::Record;

/// What a merge did to the collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Keep-alive; collection untouched
    Unchanged,
    /// Existing record replaced at `index`
    Replaced { index: usize },
    /// New record prepended
    Inserted,
}

impl MergeOutcome {
    /// Whether observers need to be notified
    pub fn is_mutation(&self) -> bool {
        !matches!(self, MergeOutcome::Unchanged)
    }
}

/// Fold one push message into the ordered collection
///
/// Deterministic and free of I/O. A record whose id is already present
/// replaces the old entry at the same position; an unseen id goes to the
/// front. Ids stay unique as long as they were unique on entry.
pub fn merge(collection: &mut Vec<Record>, message: InboundMessage) -> MergeOutcome {
    let record = match message {
        InboundMessage::KeepAlive => return MergeOutcome::Unchanged,
        InboundMessage::Update(record) => record,
    };

    match collection.iter().position(|existing| existing.id == record.id) {
        Some(index) => {
            collection[index] = record;
            MergeOutcome::Replaced { index }
        }
        None => {
            collection.insert(0, record);
            MergeOutcome::Inserted
        }
    }
}

/// Drop later duplicates of an id, keeping the first occurrence in place
///
/// Applied to bulk-fetch results so the unique-id invariant holds before any
/// merge runs.
pub fn dedup_by_id(records: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.id.clone()))
        .collect()
}
