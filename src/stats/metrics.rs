//! Counters for a live subscription

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared between the controller and its connection supervisor
#[derive(Debug, Default)]
pub struct SyncCounters {
    pub(crate) fetches_started: AtomicU64,
    pub(crate) fetch_failures: AtomicU64,
    pub(crate) updates_applied: AtomicU64,
    pub(crate) records_inserted: AtomicU64,
    pub(crate) records_replaced: AtomicU64,
    pub(crate) keep_alives_received: AtomicU64,
    pub(crate) malformed_dropped: AtomicU64,
    pub(crate) messages_replayed: AtomicU64,
    pub(crate) updates_coalesced: AtomicU64,
    pub(crate) connections_opened: AtomicU64,
    pub(crate) reconnects: AtomicU64,
    pub(crate) heartbeats_sent: AtomicU64,
}

impl SyncCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> SyncStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SyncStats {
            fetches_started: load(&self.fetches_started),
            fetch_failures: load(&self.fetch_failures),
            updates_applied: load(&self.updates_applied),
            records_inserted: load(&self.records_inserted),
            records_replaced: load(&self.records_replaced),
            keep_alives_received: load(&self.keep_alives_received),
            malformed_dropped: load(&self.malformed_dropped),
            messages_replayed: load(&self.messages_replayed),
            updates_coalesced: load(&self.updates_coalesced),
            connections_opened: load(&self.connections_opened),
            reconnects: load(&self.reconnects),
            heartbeats_sent: load(&self.heartbeats_sent),
        }
    }
}

/// Subscription statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Bulk fetches issued (initial plus refetches)
    pub fetches_started: u64,
    /// Bulk fetches that failed
    pub fetch_failures: u64,
    /// Updates merged into the collection
    pub updates_applied: u64,
    /// Updates that prepended a new record
    pub records_inserted: u64,
    /// Updates that replaced an existing record
    pub records_replaced: u64,
    /// Keep-alives received from the server
    pub keep_alives_received: u64,
    /// Undecodable push payloads dropped
    pub malformed_dropped: u64,
    /// Buffered updates replayed onto a fresh baseline
    pub messages_replayed: u64,
    /// Buffered updates folded into an earlier one for the same id
    pub updates_coalesced: u64,
    /// Successful push handshakes
    pub connections_opened: u64,
    /// Reconnect attempts after a failure or abrupt close
    pub reconnects: u64,
    /// Keep-alives sent
    pub heartbeats_sent: u64,
}
