//! Records and the merge rule
//!
//! A [`Record`] is one entry of the synchronized collection, keyed by
//! [`RecordId`]. Push payloads decode into an [`InboundMessage`], and
//! [`merge`] folds them into the ordered collection:
//!
//! - keep-alives never touch the collection
//! - an update for a known id replaces it in place
//! - an update for an unseen id is prepended (newest first)

pub mod merge;
pub mod message;
pub mod model;

pub use merge::{dedup_by_id, merge, MergeOutcome};
pub use message::{InboundMessage, KEEP_ALIVE_ACTION};
pub use model::{LineItem, Record, RecordId};
