//! Synchronization statistics

pub mod metrics;

pub use metrics::{SyncCounters, SyncStats};
