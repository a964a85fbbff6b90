//! Published view of the cached collection

use std::sync::Arc;

use crate::error::FetchError;
use crate::record::{Record, RecordId};

/// Outcome of the latest bulk fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// No fetch has resolved yet
    Pending,
    /// The latest fetch succeeded
    Fulfilled,
    /// The latest fetch failed; see `error`
    Rejected,
}

/// Immutable view of the collection at one point in time
#[derive(Debug, Clone)]
pub struct CollectionSnapshot {
    pub status: QueryStatus,

    /// Records, newest first. `None` until a bulk fetch has succeeded.
    pub data: Option<Arc<Vec<Record>>>,

    /// Error of the latest fetch, if it failed
    pub error: Option<FetchError>,

    /// A bulk fetch is in flight
    pub is_fetching: bool,

    /// Bumped on every publish
    pub revision: u64,
}

impl CollectionSnapshot {
    pub(crate) fn pending() -> Self {
        Self {
            status: QueryStatus::Pending,
            data: None,
            error: None,
            is_fetching: false,
            revision: 0,
        }
    }

    /// No data and no error yet
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.status == QueryStatus::Pending
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Rejected
    }

    /// Records, or an empty slice before the first successful fetch
    pub fn records(&self) -> &[Record] {
        self.data.as_deref().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records().iter().find(|record| &record.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.records().iter().map(|record| record.id.as_str()).collect()
    }
}
