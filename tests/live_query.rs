//! End-to-end tests for live queries over an in-memory push transport.
//!
//! These tests verify that:
//! 1. Push updates are merged into the fetched baseline (prepend / replace)
//! 2. Updates that arrive before the baseline are replayed in order
//! 3. Keep-alives never reach the collection
//! 4. Teardown before the fetch resolves discards the result
//! 5. Refetch reuses the connection, lingering reuses the subscription
//! 6. The heartbeat stops once the last consumer leaves

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use url::Url;

use livesync_rs::error::{FetchError, TransportError};
use livesync_rs::{
    AuthToken, ConnectionPhase, Connector, LiveQuery, PushSocket, QueryHandle, QueryStatus,
    Record, SyncConfig,
};

const WAIT: Duration = Duration::from_secs(5);

type FetchResult = Result<Vec<Record>, FetchError>;

// =============================================================================
// IN-MEMORY TRANSPORT
// =============================================================================

/// Server side of one accepted connection
struct Peer {
    inbound: mpsc::UnboundedSender<Option<Bytes>>,
    outbound: mpsc::UnboundedReceiver<Bytes>,
}

impl Peer {
    fn push(&self, text: &str) {
        let _ = self.inbound.send(Some(Bytes::from(text.to_string())));
    }
}

struct MemorySocket {
    inbound: mpsc::UnboundedReceiver<Option<Bytes>>,
    outbound: mpsc::UnboundedSender<Bytes>,
}

impl PushSocket for MemorySocket {
    fn send(&mut self, payload: Bytes) -> BoxFuture<'_, Result<(), TransportError>> {
        let result = self
            .outbound
            .send(payload)
            .map_err(|_| TransportError::Send("peer gone".into()));
        Box::pin(async move { result })
    }

    fn recv(&mut self) -> BoxFuture<'_, Option<Result<Bytes, TransportError>>> {
        Box::pin(async move { self.inbound.recv().await.flatten().map(Ok) })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Accepts every connection and hands the peer to the test
struct MemoryConnector {
    peers: mpsc::UnboundedSender<Peer>,
    urls: Arc<Mutex<Vec<Url>>>,
}

impl Connector for MemoryConnector {
    fn connect(&self, url: &Url) -> BoxFuture<'static, Result<Box<dyn PushSocket>, TransportError>> {
        self.urls.lock().push(url.clone());

        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let _ = self.peers.send(Peer {
            inbound: in_tx,
            outbound: out_rx,
        });

        let socket = MemorySocket {
            inbound: in_rx,
            outbound: out_tx,
        };
        Box::pin(async move { Ok(Box::new(socket) as Box<dyn PushSocket>) })
    }
}

// =============================================================================
// SCRIPTED FETCHER
// =============================================================================

/// Serves queued fetch results; an empty queue serves an empty collection
#[derive(Default)]
struct ScriptedFetcher {
    script: Mutex<VecDeque<oneshot::Receiver<FetchResult>>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    fn respond(&self, result: FetchResult) {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        self.script.lock().push_back(rx);
    }

    /// Queue a result the test releases later
    fn gate(&self) -> oneshot::Sender<FetchResult> {
        let (tx, rx) = oneshot::channel();
        self.script.lock().push_back(rx);
        tx
    }

    fn next(&self) -> impl Future<Output = FetchResult> + Send + 'static {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.script.lock().pop_front();
        async move {
            match pending {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(FetchError::Network("gate dropped".into()))),
                None => Ok(Vec::new()),
            }
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

// =============================================================================
// HARNESS
// =============================================================================

struct Harness {
    query: LiveQuery,
    fetcher: Arc<ScriptedFetcher>,
    peers: mpsc::UnboundedReceiver<Peer>,
    urls: Arc<Mutex<Vec<Url>>>,
}

impl Harness {
    fn new(config: SyncConfig) -> Self {
        Self::with_token(config, AuthToken::new("t0k3n"))
    }

    fn with_token(config: SyncConfig, token: AuthToken) -> Self {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let (peer_tx, peers) = mpsc::unbounded_channel();
        let urls = Arc::new(Mutex::new(Vec::new()));

        let connector = MemoryConnector {
            peers: peer_tx,
            urls: Arc::clone(&urls),
        };
        let source = Arc::clone(&fetcher);
        let query = LiveQuery::with_connector(
            config,
            move |_token: Option<String>| source.next(),
            connector,
            token,
        )
        .unwrap();

        Self {
            query,
            fetcher,
            peers,
            urls,
        }
    }

    async fn next_peer(&mut self) -> Peer {
        tokio::time::timeout(WAIT, self.peers.recv())
            .await
            .expect("no connection attempt")
            .expect("connector dropped")
    }
}

fn config() -> SyncConfig {
    SyncConfig::default().keep_unused_for(Duration::ZERO)
}

fn order(id: &str, status: &str) -> Record {
    Record::new(id).with_status(status)
}

fn update(id: &str, status: &str) -> String {
    format!(r#"{{"sk":"{id}","status":"{status}"}}"#)
}

/// Wait until the collection satisfies `done`
async fn wait_until(handle: &QueryHandle, done: impl Fn(&[Record]) -> bool) -> Vec<Record> {
    let mut view = handle.watch();
    let snapshot = tokio::time::timeout(WAIT, view.wait_for(|s| done(s.records())))
        .await
        .expect("collection never reached the expected state")
        .expect("subscription stopped");
    snapshot.records().to_vec()
}

fn ids(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

// =============================================================================
// MERGE BEHAVIOUR
// =============================================================================

#[tokio::test]
async fn test_unseen_record_is_prepended() {
    let mut h = Harness::new(config());
    h.fetcher.respond(Ok(vec![order("A", "open")]));

    let mut handle = h.query.subscribe();
    let peer = h.next_peer().await;
    handle.wait_until_loaded().await.unwrap();

    peer.push(&update("B", "open"));

    let records = wait_until(&handle, |r| r.len() == 2).await;
    assert_eq!(ids(&records), vec!["B", "A"]);
}

#[tokio::test]
async fn test_known_record_is_replaced_in_place() {
    let mut h = Harness::new(config());
    h.fetcher
        .respond(Ok(vec![order("C", "open"), order("A", "open")]));

    let mut handle = h.query.subscribe();
    let peer = h.next_peer().await;
    handle.wait_until_loaded().await.unwrap();

    peer.push(&update("A", "shipped"));

    let records = wait_until(&handle, |r| {
        r.iter().any(|o| o.status.as_deref() == Some("shipped"))
    })
    .await;
    assert_eq!(ids(&records), vec!["C", "A"]);
    assert_eq!(records[1].status.as_deref(), Some("shipped"));
}

#[tokio::test]
async fn test_backend_shaped_update_is_merged() {
    let mut h = Harness::new(config());
    h.fetcher.respond(Ok(vec![order("A", "open")]));

    let mut handle = h.query.subscribe();
    let peer = h.next_peer().await;
    handle.wait_until_loaded().await.unwrap();

    peer.push(r#"{"id":"B","sk":"B","total":10.5,"status":"open"}"#);
    peer.push(r#"{"id":7,"status":"open"}"#);

    let records = wait_until(&handle, |r| r.len() == 3).await;
    assert_eq!(ids(&records), vec!["7", "B", "A"]);
    assert_eq!(records[1].total, None);
    assert!(records[1].extra.contains_key("total"));
    assert!(records[1].extra.contains_key("sk"));
}

#[tokio::test]
async fn test_updates_before_baseline_are_replayed_in_order() {
    let mut h = Harness::new(config());
    let gate = h.fetcher.gate();

    let mut handle = h.query.subscribe();
    let peer = h.next_peer().await;
    let mut phase = handle.watch_connection();
    tokio::time::timeout(WAIT, phase.wait_for(|p| p.is_open()))
        .await
        .unwrap()
        .unwrap();

    peer.push(&update("B", "open"));
    peer.push(&update("A", "packed"));
    peer.push(&update("B", "shipped"));
    assert!(handle.snapshot().is_loading());

    gate.send(Ok(vec![order("A", "open")])).unwrap();

    let records = wait_until(&handle, |r| {
        r.len() == 2 && r[0].status.as_deref() == Some("shipped")
    })
    .await;
    assert_eq!(ids(&records), vec!["B", "A"]);
    assert_eq!(records[1].status.as_deref(), Some("packed"));
}

#[tokio::test]
async fn test_keep_alive_never_reaches_collection() {
    let mut h = Harness::new(config());
    let gate = h.fetcher.gate();

    let mut handle = h.query.subscribe();
    let peer = h.next_peer().await;

    peer.push(r#"{"action":"keepAlive"}"#);
    peer.push(&update("B", "open"));
    gate.send(Ok(vec![order("A", "open")])).unwrap();

    let records = wait_until(&handle, |r| r.len() == 2).await;
    assert_eq!(ids(&records), vec!["B", "A"]);

    let stats = h.query.stats().unwrap();
    assert_eq!(stats.keep_alives_received, 1);
    assert_eq!(stats.updates_applied, 1);
}

#[tokio::test]
async fn test_malformed_payload_is_dropped() {
    let mut h = Harness::new(config());
    h.fetcher.respond(Ok(vec![order("A", "open")]));

    let mut handle = h.query.subscribe();
    let peer = h.next_peer().await;
    handle.wait_until_loaded().await.unwrap();

    peer.push("not json");
    peer.push(r#"{"status":"no id"}"#);
    peer.push(&update("B", "open"));

    let records = wait_until(&handle, |r| r.len() == 2).await;
    assert_eq!(ids(&records), vec!["B", "A"]);
    assert_eq!(h.query.stats().unwrap().malformed_dropped, 2);
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[tokio::test]
async fn test_push_url_carries_token() {
    let mut h = Harness::new(config());
    let _handle = h.query.subscribe();
    let _peer = h.next_peer().await;

    let url = h.urls.lock()[0].clone();
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    assert_eq!(pairs, vec![("authorization".to_string(), "t0k3n".to_string())]);
}

#[tokio::test]
async fn test_unsubscribe_before_fetch_discards_result() {
    let mut h = Harness::new(config());
    let gate = h.fetcher.gate();

    let handle = h.query.subscribe();
    let _peer = h.next_peer().await;
    let view = handle.watch();

    handle.unsubscribe();
    assert!(!h.query.is_active());

    let _ = gate.send(Ok(vec![order("late", "open")]));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = view.borrow().clone();
    assert!(snapshot.data.is_none());
    assert_eq!(snapshot.status, QueryStatus::Pending);
}

#[tokio::test]
async fn test_fetch_failure_is_reported() {
    let mut h = Harness::new(config());
    h.fetcher.respond(Err(FetchError::Http {
        status: 500,
        message: "boom".into(),
    }));

    let mut handle = h.query.subscribe();
    let _peer = h.next_peer().await;

    let snapshot = handle.wait_until_loaded().await.unwrap();

    assert!(snapshot.is_error());
    assert!(snapshot.data.is_none());
    assert!(matches!(snapshot.error, Some(FetchError::Http { status: 500, .. })));
}

#[tokio::test]
async fn test_refetch_keeps_connection() {
    let mut h = Harness::new(config());
    h.fetcher.respond(Ok(vec![order("A", "open")]));
    h.fetcher
        .respond(Ok(vec![order("C", "open"), order("A", "open")]));

    let mut handle = h.query.subscribe();
    let _peer = h.next_peer().await;
    handle.wait_until_loaded().await.unwrap();

    handle.refetch();

    let records = wait_until(&handle, |r| r.len() == 2).await;
    assert_eq!(ids(&records), vec!["C", "A"]);
    assert_eq!(h.fetcher.calls(), 2);
    assert_eq!(h.urls.lock().len(), 1);
    assert_eq!(handle.connection_phase(), ConnectionPhase::Open);
}

#[tokio::test(start_paused = true)]
async fn test_lingering_subscription_keeps_cache() {
    let mut h = Harness::new(SyncConfig::default().keep_unused_for(Duration::from_secs(5)));
    h.fetcher.respond(Ok(vec![order("A", "open")]));

    let mut first = h.query.subscribe();
    let _peer = h.next_peer().await;
    first.wait_until_loaded().await.unwrap();
    let id = first.subscription_id();
    first.unsubscribe();

    tokio::time::sleep(Duration::from_secs(1)).await;
    let second = h.query.subscribe();

    assert_eq!(second.subscription_id(), id);
    assert_eq!(ids(&second.records()), vec!["A"]);
    assert_eq!(h.fetcher.calls(), 1);
    assert_eq!(h.urls.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_stops_after_unsubscribe() {
    let interval = Duration::from_secs(570);
    let mut h = Harness::new(config().heartbeat_interval(interval));

    let handle = h.query.subscribe();
    let mut peer = h.next_peer().await;
    let mut phase = handle.watch_connection();

    tokio::time::sleep(interval + Duration::from_secs(1)).await;
    let beat = peer.outbound.try_recv().unwrap();
    assert_eq!(&beat[..], br#"{"action":"keepAlive"}"#);

    handle.unsubscribe();
    phase.wait_for(|p| p.is_closed()).await.unwrap();

    tokio::time::sleep(interval * 3).await;
    assert!(peer.outbound.try_recv().is_err());
}

#[tokio::test]
async fn test_missing_token_connects_without_query() {
    let mut h = Harness::with_token(config(), AuthToken::default());
    let _handle = h.query.subscribe();
    let _peer = h.next_peer().await;

    assert_eq!(h.urls.lock()[0].query(), None);
}
