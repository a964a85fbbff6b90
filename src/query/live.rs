//! Shared live query with consumer reference counting
//!
//! Every [`LiveQuery::subscribe`] call returns a [`QueryHandle`]. The first
//! handle starts a [`Subscription`]; later handles share it. When the last
//! handle goes away the subscription lingers for
//! [`SyncConfig::keep_unused_for`] so a quick re-subscribe reuses the cached
//! collection and the open connection instead of starting over.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::fetch::CollectionFetcher;
use super::snapshot::CollectionSnapshot;
use super::subscription::{Command, Subscription};
use crate::config::{AuthToken, SyncConfig};
use crate::connection::{ConnectionPhase, Connector, WsConnector};
use crate::error::ConfigError;
use crate::record::Record;
use crate::stats::SyncStats;

/// Live, shared view of the collection
///
/// Cheap to clone; clones share the same subscription.
#[derive(Clone)]
pub struct LiveQuery {
    inner: Arc<Shared>,
}

struct Shared {
    config: SyncConfig,
    fetcher: Arc<dyn CollectionFetcher>,
    connector: Arc<dyn Connector>,
    token: AuthToken,
    slot: Mutex<Option<Entry>>,
    next_id: AtomicU64,
}

struct Entry {
    subscription: Subscription,
    consumers: usize,
    /// Pending teardown after the last consumer left
    linger: Option<JoinHandle<()>>,
}

impl LiveQuery {
    /// Live query over the WebSocket transport
    pub fn new(
        config: SyncConfig,
        fetcher: impl CollectionFetcher,
        token: AuthToken,
    ) -> Result<Self, ConfigError> {
        Self::with_connector(config, fetcher, WsConnector, token)
    }

    /// Live query over a custom transport
    pub fn with_connector(
        config: SyncConfig,
        fetcher: impl CollectionFetcher,
        connector: impl Connector,
        token: AuthToken,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(Shared {
                config,
                fetcher: Arc::new(fetcher),
                connector: Arc::new(connector),
                token,
                slot: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Register a consumer, starting the subscription if none is active.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(&self) -> QueryHandle {
        let shared = &self.inner;
        let mut slot = shared.slot.lock();

        let entry = match slot.take() {
            Some(mut entry) => {
                if let Some(linger) = entry.linger.take() {
                    linger.abort();
                    tracing::debug!(
                        subscription_id = entry.subscription.id(),
                        "Unused subscription reclaimed"
                    );
                }
                entry.consumers += 1;
                entry
            }
            None => {
                let id = shared.next_id.fetch_add(1, Ordering::Relaxed) + 1;
                let subscription = Subscription::start(
                    id,
                    &shared.config,
                    Arc::clone(&shared.fetcher),
                    Arc::clone(&shared.connector),
                    shared.token.get(),
                );
                Entry {
                    subscription,
                    consumers: 1,
                    linger: None,
                }
            }
        };

        tracing::debug!(
            subscription_id = entry.subscription.id(),
            consumers = entry.consumers,
            "Consumer subscribed"
        );

        let handle = QueryHandle {
            shared: Arc::clone(shared),
            subscription_id: entry.subscription.id(),
            view: entry.subscription.watch(),
            connection: entry.subscription.watch_connection(),
            commands: entry.subscription.command_sender(),
            released: false,
        };
        *slot = Some(entry);
        handle
    }

    /// A subscription exists, possibly lingering without consumers
    pub fn is_active(&self) -> bool {
        self.inner.slot.lock().is_some()
    }

    pub fn consumer_count(&self) -> usize {
        self.inner
            .slot
            .lock()
            .as_ref()
            .map(|entry| entry.consumers)
            .unwrap_or(0)
    }

    /// Statistics of the active subscription
    pub fn stats(&self) -> Option<SyncStats> {
        self.inner
            .slot
            .lock()
            .as_ref()
            .map(|entry| entry.subscription.stats())
    }

    /// Re-run the bulk fetch of the active subscription
    pub fn refetch(&self) {
        if let Some(entry) = self.inner.slot.lock().as_ref() {
            entry.subscription.refetch();
        }
    }

    /// Stop the subscription now, regardless of consumers, and wait until
    /// its connection is closed.
    ///
    /// Existing handles keep their last snapshot.
    pub async fn shutdown(&self) {
        let entry = self.inner.slot.lock().take();
        if let Some(mut entry) = entry {
            if let Some(linger) = entry.linger.take() {
                linger.abort();
            }
            entry.subscription.stop_and_wait().await;
        }
    }
}

impl Shared {
    fn release(self: &Arc<Self>, subscription_id: u64) {
        let mut slot = self.slot.lock();
        let Some(entry) = slot.as_mut() else {
            return;
        };
        if entry.subscription.id() != subscription_id {
            return;
        }

        entry.consumers = entry.consumers.saturating_sub(1);
        tracing::debug!(
            subscription_id,
            consumers = entry.consumers,
            "Consumer unsubscribed"
        );
        if entry.consumers > 0 {
            return;
        }

        let linger = self.config.keep_unused_for;
        if !linger.is_zero() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let shared: Weak<Self> = Arc::downgrade(self);
                entry.linger = Some(runtime.spawn(async move {
                    tokio::time::sleep(linger).await;
                    if let Some(shared) = shared.upgrade() {
                        shared.expire(subscription_id);
                    }
                }));
                tracing::debug!(
                    subscription_id,
                    linger_ms = linger.as_millis() as u64,
                    "Subscription unused, lingering"
                );
                return;
            }
        }

        let expired = slot.take();
        drop(slot);
        drop(expired);
    }

    fn expire(&self, subscription_id: u64) {
        let mut slot = self.slot.lock();
        let unused = slot
            .as_ref()
            .is_some_and(|entry| entry.subscription.id() == subscription_id && entry.consumers == 0);
        if !unused {
            return;
        }

        let expired = slot.take();
        drop(slot);
        tracing::debug!(subscription_id, "Unused subscription expired");
        drop(expired);
    }
}

/// One consumer's view of a [`LiveQuery`]
///
/// Dropping the handle unsubscribes.
pub struct QueryHandle {
    shared: Arc<Shared>,
    subscription_id: u64,
    view: watch::Receiver<CollectionSnapshot>,
    connection: watch::Receiver<ConnectionPhase>,
    commands: mpsc::UnboundedSender<Command>,
    released: bool,
}

impl QueryHandle {
    pub fn subscription_id(&self) -> u64 {
        self.subscription_id
    }

    /// Current view of the collection
    pub fn snapshot(&self) -> CollectionSnapshot {
        self.view.borrow().clone()
    }

    /// Current records, newest first
    pub fn records(&self) -> Vec<Record> {
        self.view.borrow().records().to_vec()
    }

    /// Receiver notified on every change; outlives the handle
    pub fn watch(&self) -> watch::Receiver<CollectionSnapshot> {
        self.view.clone()
    }

    /// Wait for the next change.
    ///
    /// Returns `None` once the subscription has stopped.
    pub async fn changed(&mut self) -> Option<CollectionSnapshot> {
        self.view.changed().await.ok()?;
        Some(self.view.borrow_and_update().clone())
    }

    /// Wait until the first fetch has resolved, successfully or not
    pub async fn wait_until_loaded(&mut self) -> Option<CollectionSnapshot> {
        let snapshot = self.view.wait_for(|snapshot| !snapshot.is_loading()).await.ok()?;
        Some(snapshot.clone())
    }

    /// Re-run the bulk fetch, keeping the connection
    pub fn refetch(&self) {
        let _ = self.commands.send(Command::Refetch);
    }

    pub fn connection_phase(&self) -> ConnectionPhase {
        *self.connection.borrow()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionPhase> {
        self.connection.clone()
    }

    /// Release this consumer
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.shared.release(self.subscription_id);
        }
    }
}

impl Drop for QueryHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures_util::future::BoxFuture;
    use url::Url;

    use crate::connection::PushSocket;
    use crate::error::{FetchError, TransportError};

    struct Unreachable;

    impl Connector for Unreachable {
        fn connect(&self, _url: &Url) -> BoxFuture<'static, Result<Box<dyn PushSocket>, TransportError>> {
            Box::pin(async { Err(TransportError::Connect("refused".into())) })
        }
    }

    fn live(linger: Duration) -> LiveQuery {
        let fetcher = |_token: Option<String>| async {
            Ok::<_, FetchError>(vec![Record::new("A").with_status("open")])
        };
        LiveQuery::with_connector(
            SyncConfig::default().keep_unused_for(linger),
            fetcher,
            Unreachable,
            AuthToken::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_consumers_share_one_subscription() {
        let query = live(Duration::ZERO);

        let a = query.subscribe();
        let b = query.subscribe();

        assert_eq!(a.subscription_id(), b.subscription_id());
        assert_eq!(query.consumer_count(), 2);

        drop(a);
        assert!(query.is_active());
        assert_eq!(query.consumer_count(), 1);

        drop(b);
        assert!(!query.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lingering_subscription_is_reused() {
        let query = live(Duration::from_secs(5));

        let first = query.subscribe();
        let id = first.subscription_id();
        first.unsubscribe();
        assert!(query.is_active());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let second = query.subscribe();

        assert_eq!(second.subscription_id(), id);

        // the aborted linger must not tear down the reused subscription
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(query.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unused_subscription_expires() {
        let query = live(Duration::from_secs(5));

        let first = query.subscribe();
        let id = first.subscription_id();
        drop(first);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!query.is_active());

        let second = query.subscribe();
        assert_ne!(second.subscription_id(), id);
    }

    #[tokio::test]
    async fn test_wait_until_loaded() {
        let query = live(Duration::ZERO);
        let mut handle = query.subscribe();

        let snapshot = handle.wait_until_loaded().await.unwrap();

        assert_eq!(snapshot.ids(), vec!["A"]);
        assert_eq!(handle.records().len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_with_drop() {
        let query = live(Duration::ZERO);
        let a = query.subscribe();
        let _b = query.subscribe();

        a.unsubscribe();

        assert_eq!(query.consumer_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_handle_does_not_release_new_subscription() {
        let query = live(Duration::ZERO);
        let old = query.subscribe();

        query.shutdown().await;
        let fresh = query.subscribe();
        drop(old);

        assert!(query.is_active());
        assert_eq!(query.consumer_count(), 1);
        drop(fresh);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let fetcher = |_token: Option<String>| async { Ok::<_, FetchError>(Vec::new()) };
        let config = SyncConfig::default().heartbeat_interval(Duration::ZERO);

        let result = LiveQuery::with_connector(config, fetcher, Unreachable, AuthToken::default());

        assert!(matches!(result, Err(ConfigError::ZeroHeartbeat)));
    }
}
