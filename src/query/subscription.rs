//! Subscription lifecycle controller
//!
//! A [`Subscription`] runs one controller task that owns the cached
//! collection. It starts the bulk fetch, spawns the
//! [`ConnectionSupervisor`] without waiting for the fetch, and then reacts to
//! three inputs in priority order: commands (refetch, stop), fetch results,
//! and push events.
//!
//! Until a fetch result lands, updates are queued and later replayed onto
//! that result in arrival order. The queue holds one entry per id, so a
//! stalled fetch costs memory per distinct record, not per message. While a refetch is in flight, updates are
//! applied live and also queued, so the new baseline cannot lose them.
//! Keep-alives are never queued.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::fetch::CollectionFetcher;
use super::replay::ReplayQueue;
use super::snapshot::{CollectionSnapshot, QueryStatus};
use crate::config::SyncConfig;
use crate::connection::{
    push_url, redacted, ConnectionPhase, ConnectionSupervisor, Connector, PushEvent,
};
use crate::error::FetchError;
use crate::record::{dedup_by_id, merge, InboundMessage, MergeOutcome, Record};
use crate::stats::{SyncCounters, SyncStats};

/// Requests from consumers to the controller task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Refetch,
    Stop,
}

type FetchResult = (u64, Result<Vec<Record>, FetchError>);

/// One active interest in the collection
///
/// Dropping a subscription stops it.
pub struct Subscription {
    id: u64,
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<CollectionSnapshot>,
    connection: watch::Receiver<ConnectionPhase>,
    stats: Arc<SyncCounters>,
    task: Option<JoinHandle<()>>,
    stopped: bool,
}

impl Subscription {
    /// Start fetching and connecting.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        id: u64,
        config: &SyncConfig,
        fetcher: Arc<dyn CollectionFetcher>,
        connector: Arc<dyn Connector>,
        token: Option<String>,
    ) -> Self {
        let stats = Arc::new(SyncCounters::new());
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let (mut controller, view) = Controller::new(
            id,
            fetcher,
            token.clone(),
            Arc::clone(&stats),
            command_rx,
        );
        controller.begin_fetch();

        if token.is_none() {
            tracing::warn!(subscription_id = id, "No auth token, push connection is unauthenticated");
        }
        let url = push_url(&config.push_endpoint, token.as_deref());
        let (supervisor, events) =
            ConnectionSupervisor::spawn(config, url, connector, Arc::clone(&stats));
        let connection = supervisor.watch_phase();

        tracing::info!(
            subscription_id = id,
            endpoint = %redacted(&config.push_endpoint),
            "Subscription started"
        );

        let task = tokio::spawn(controller.run(supervisor, events));

        Self {
            id,
            commands: command_tx,
            view,
            connection,
            stats,
            task: Some(task),
            stopped: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Re-run the bulk fetch, keeping the push connection
    pub fn refetch(&self) {
        if !self.stopped {
            let _ = self.commands.send(Command::Refetch);
        }
    }

    /// Tear down. Idempotent; a fetch still in flight is discarded when it
    /// resolves.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let _ = self.commands.send(Command::Stop);
        tracing::debug!(subscription_id = self.id, "Subscription stop requested");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stop and wait until the connection is closed
    pub async fn stop_and_wait(&mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(subscription_id = self.id, error = %e, "Subscription task failed");
            }
        }
    }

    /// Current view of the collection
    pub fn snapshot(&self) -> CollectionSnapshot {
        self.view.borrow().clone()
    }

    /// Receiver notified on every change of the collection
    pub fn watch(&self) -> watch::Receiver<CollectionSnapshot> {
        self.view.clone()
    }

    pub fn connection_phase(&self) -> ConnectionPhase {
        *self.connection.borrow()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionPhase> {
        self.connection.clone()
    }

    pub fn stats(&self) -> SyncStats {
        self.stats.snapshot()
    }

    pub(crate) fn command_sender(&self) -> mpsc::UnboundedSender<Command> {
        self.commands.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the controller task
struct Controller {
    id: u64,
    fetcher: Arc<dyn CollectionFetcher>,
    token: Option<String>,
    stats: Arc<SyncCounters>,
    view: watch::Sender<CollectionSnapshot>,
    commands: mpsc::UnboundedReceiver<Command>,
    fetch_tx: mpsc::UnboundedSender<FetchResult>,
    fetch_rx: mpsc::UnboundedReceiver<FetchResult>,

    collection: Vec<Record>,
    loaded: bool,
    status: QueryStatus,
    error: Option<FetchError>,

    /// Generation of the latest fetch; older results are stale
    generation: u64,
    fetch_in_flight: bool,
    replay: ReplayQueue,
    revision: u64,
}

impl Controller {
    fn new(
        id: u64,
        fetcher: Arc<dyn CollectionFetcher>,
        token: Option<String>,
        stats: Arc<SyncCounters>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> (Self, watch::Receiver<CollectionSnapshot>) {
        let (view_tx, view_rx) = watch::channel(CollectionSnapshot::pending());
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();

        let controller = Self {
            id,
            fetcher,
            token,
            stats,
            view: view_tx,
            commands,
            fetch_tx,
            fetch_rx,
            collection: Vec::new(),
            loaded: false,
            status: QueryStatus::Pending,
            error: None,
            generation: 0,
            fetch_in_flight: false,
            replay: ReplayQueue::default(),
            revision: 0,
        };

        (controller, view_rx)
    }

    async fn run(
        mut self,
        mut supervisor: ConnectionSupervisor,
        mut events: mpsc::Receiver<PushEvent>,
    ) {
        let mut events_open = true;

        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Refetch) => self.begin_fetch(),
                    Some(Command::Stop) | None => break,
                },
                Some((generation, result)) = self.fetch_rx.recv() => {
                    self.on_fetch_resolved(generation, result);
                }
                event = events.recv(), if events_open => match event {
                    Some(event) => self.on_push_event(event),
                    None => {
                        events_open = false;
                        tracing::debug!(subscription_id = self.id, "Push event stream ended");
                    }
                },
            }
        }

        // unblocks a supervisor waiting on a full event channel
        drop(events);
        supervisor.shutdown().await;
        tracing::info!(
            subscription_id = self.id,
            records = self.collection.len(),
            "Subscription stopped"
        );
    }

    fn begin_fetch(&mut self) {
        self.generation += 1;
        self.fetch_in_flight = true;
        SyncCounters::bump(&self.stats.fetches_started);

        let generation = self.generation;
        let subscription_id = self.id;
        let fetch = self.fetcher.fetch_collection(self.token.clone());
        let results = self.fetch_tx.clone();

        tokio::spawn(async move {
            let result = fetch.await;
            if results.send((generation, result)).is_err() {
                tracing::debug!(
                    subscription_id,
                    generation,
                    "Fetch resolved after teardown, discarding"
                );
            }
        });

        tracing::debug!(subscription_id, generation, "Bulk fetch started");
        self.publish();
    }

    fn on_fetch_resolved(&mut self, generation: u64, result: Result<Vec<Record>, FetchError>) {
        if generation != self.generation {
            tracing::debug!(
                subscription_id = self.id,
                generation,
                latest = self.generation,
                "Ignoring superseded fetch result"
            );
            return;
        }
        self.fetch_in_flight = false;

        match result {
            Ok(records) => {
                let fetched = records.len();
                self.collection = dedup_by_id(records);
                self.loaded = true;
                self.status = QueryStatus::Fulfilled;
                self.error = None;

                let replayed = self.replay.messages();
                for record in self.replay.drain() {
                    self.apply(record);
                }
                SyncCounters::add(&self.stats.messages_replayed, replayed);

                tracing::info!(
                    subscription_id = self.id,
                    records = fetched,
                    replayed,
                    "Baseline loaded"
                );
            }
            Err(e) => {
                SyncCounters::bump(&self.stats.fetch_failures);
                tracing::warn!(subscription_id = self.id, error = %e, "Bulk fetch failed");
                self.status = QueryStatus::Rejected;
                self.error = Some(e);
                // with a baseline the queued updates were applied live already
                if self.loaded {
                    self.replay.clear();
                }
            }
        }

        self.publish();
    }

    fn on_push_event(&mut self, event: PushEvent) {
        match event {
            PushEvent::Opened => {
                tracing::debug!(subscription_id = self.id, "Push channel attached");
            }
            PushEvent::Interrupted => {
                tracing::debug!(subscription_id = self.id, "Push channel interrupted");
            }
            PushEvent::Message(InboundMessage::KeepAlive) => {
                SyncCounters::bump(&self.stats.keep_alives_received);
            }
            PushEvent::Message(InboundMessage::Update(record)) => {
                if !self.loaded {
                    self.enqueue(record);
                    return;
                }
                if self.fetch_in_flight {
                    self.enqueue(record.clone());
                }
                if self.apply(record).is_mutation() {
                    self.publish();
                }
            }
        }
    }

    fn enqueue(&mut self, record: Record) {
        if self.replay.push(record) {
            SyncCounters::bump(&self.stats.updates_coalesced);
        }
    }

    fn apply(&mut self, record: Record) -> MergeOutcome {
        let id = record.id.clone();
        let outcome = merge(&mut self.collection, InboundMessage::Update(record));

        SyncCounters::bump(&self.stats.updates_applied);
        match outcome {
            MergeOutcome::Inserted => SyncCounters::bump(&self.stats.records_inserted),
            MergeOutcome::Replaced { .. } => SyncCounters::bump(&self.stats.records_replaced),
            MergeOutcome::Unchanged => {}
        }
        tracing::trace!(subscription_id = self.id, record = %id, outcome = ?outcome, "Update merged");
        outcome
    }

    fn publish(&mut self) {
        self.revision += 1;
        let snapshot = CollectionSnapshot {
            status: self.status,
            data: self.loaded.then(|| Arc::new(self.collection.clone())),
            error: self.error.clone(),
            is_fetching: self.fetch_in_flight,
            revision: self.revision,
        };
        self.view.send_replace(snapshot);
    }
}
