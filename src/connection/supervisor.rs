//! Connection supervisor
//!
//! Drives one push connection through its [`ConnectionPhase`]s on a
//! dedicated task and hands decoded messages to the subscription over a
//! bounded channel. The channel ends when the connection reaches Closed.
//!
//! ```text
//!   Idle ──► Connecting ──► Open ◄──────┐
//!                │            │         │
//!                └──────► Reconnecting ─┘
//!
//!   any ──(close)──► Closed
//! ```
//!
//! Transport failures never leave the task: they are logged, the heartbeat
//! is cancelled, and the connection is retried with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use url::Url;

use super::heartbeat::Heartbeat;
use super::state::{ConnectionPhase, ConnectionState, InvalidTransition};
use super::transport::{redacted, Connector, PushSocket};
use crate::config::SyncConfig;
use crate::record::message::keep_alive_payload;
use crate::record::InboundMessage;
use crate::stats::SyncCounters;

/// Events from the connection supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Handshake completed (first connect or reconnect)
    Opened,

    /// A decoded push message
    Message(InboundMessage),

    /// Connection lost; a reconnect is pending
    Interrupted,
}

/// Why a pump loop over an open socket ended
enum Exit {
    Shutdown,
    ConsumerGone,
    Interrupted,
}

/// Handle to a supervised push connection
///
/// Dropping the handle tears the connection down.
pub struct ConnectionSupervisor {
    shutdown: Option<oneshot::Sender<()>>,
    phase: watch::Receiver<ConnectionPhase>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionSupervisor {
    /// Spawn the supervisor task for `url`.
    ///
    /// Returns the handle and the receiver of push events.
    pub fn spawn(
        config: &SyncConfig,
        url: Url,
        connector: Arc<dyn Connector>,
        stats: Arc<SyncCounters>,
    ) -> (Self, mpsc::Receiver<PushEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (phase_tx, phase_rx) = watch::channel(ConnectionPhase::Idle);

        let driver = Driver {
            url,
            connector,
            stats,
            events: event_tx,
            shutdown: shutdown_rx,
            phase_tx,
            state: ConnectionState::new(),
            heartbeat: Heartbeat::new(config.heartbeat_interval),
            min_backoff: config.reconnect_min_backoff,
            max_backoff: config.reconnect_max_backoff,
        };

        let task = tokio::spawn(driver.run());

        let supervisor = Self {
            shutdown: Some(shutdown_tx),
            phase: phase_rx,
            task: Some(task),
        };

        (supervisor, event_rx)
    }

    /// Current phase
    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    /// Receiver that observes every phase change
    pub fn watch_phase(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase.clone()
    }

    /// Request teardown. Idempotent.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }

    /// Request teardown and wait until the task has released the socket
    pub async fn shutdown(&mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Connection supervisor task failed");
            }
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.close();
    }
}

struct Driver {
    url: Url,
    connector: Arc<dyn Connector>,
    stats: Arc<SyncCounters>,
    events: mpsc::Sender<PushEvent>,
    shutdown: oneshot::Receiver<()>,
    phase_tx: watch::Sender<ConnectionPhase>,
    state: ConnectionState,
    heartbeat: Heartbeat,
    min_backoff: Duration,
    max_backoff: Duration,
}

impl Driver {
    async fn run(mut self) {
        let endpoint = redacted(&self.url);
        self.transition(ConnectionState::begin_connect);
        let mut backoff = self.min_backoff;

        loop {
            let connect = tokio::select! {
                biased;
                _ = &mut self.shutdown => break,
                _ = self.events.closed() => break,
                result = self.connector.connect(&self.url) => result,
            };

            let mut socket = match connect {
                Ok(socket) => socket,
                Err(e) => {
                    tracing::warn!(
                        url = %endpoint,
                        attempt = self.state.failed_attempts + 1,
                        error = %e,
                        "Push connection failed"
                    );
                    self.transition(ConnectionState::on_interrupted);
                    SyncCounters::bump(&self.stats.reconnects);
                    if !self.wait(backoff).await {
                        break;
                    }
                    backoff = next_backoff(backoff, self.max_backoff);
                    continue;
                }
            };

            backoff = self.min_backoff;
            self.transition(ConnectionState::on_open);
            self.heartbeat.start();
            SyncCounters::bump(&self.stats.connections_opened);
            tracing::info!(
                url = %endpoint,
                opens = self.state.open_count,
                heartbeat_secs = self.heartbeat.interval().as_secs(),
                "Push connection open"
            );

            let exit = if self.events.send(PushEvent::Opened).await.is_err() {
                Exit::ConsumerGone
            } else {
                self.pump(socket.as_mut()).await
            };

            self.heartbeat.cancel();
            socket.close().await;

            match exit {
                Exit::Shutdown | Exit::ConsumerGone => break,
                Exit::Interrupted => {
                    let uptime = self.state.opened_at.map(|at| at.elapsed());
                    tracing::debug!(uptime = ?uptime, "Push connection lost");
                    self.transition(ConnectionState::on_interrupted);
                    SyncCounters::bump(&self.stats.reconnects);
                    if self.events.send(PushEvent::Interrupted).await.is_err() {
                        break;
                    }
                    if !self.wait(backoff).await {
                        break;
                    }
                    backoff = next_backoff(backoff, self.max_backoff);
                }
            }
        }

        self.heartbeat.cancel();
        self.state.close();
        self.phase_tx.send_replace(ConnectionPhase::Closed);
        tracing::info!(url = %endpoint, "Push connection closed");
    }

    /// Serve an open socket until it fails or teardown is requested
    async fn pump(&mut self, socket: &mut dyn PushSocket) -> Exit {
        loop {
            tokio::select! {
                biased;
                _ = &mut self.shutdown => return Exit::Shutdown,
                _ = self.events.closed() => return Exit::ConsumerGone,
                _ = self.heartbeat.tick() => {
                    if !self.state.is_open() {
                        continue;
                    }
                    if let Err(e) = socket.send(keep_alive_payload()).await {
                        tracing::warn!(error = %e, "Keep-alive send failed");
                        return Exit::Interrupted;
                    }
                    SyncCounters::bump(&self.stats.heartbeats_sent);
                    tracing::debug!(sent = self.heartbeat.fired(), "Keep-alive sent");
                }
                frame = socket.recv() => match frame {
                    Some(Ok(payload)) => match InboundMessage::decode(&payload) {
                        Ok(message) => {
                            if self.events.send(PushEvent::Message(message)).await.is_err() {
                                return Exit::ConsumerGone;
                            }
                        }
                        Err(e) => {
                            SyncCounters::bump(&self.stats.malformed_dropped);
                            tracing::warn!(
                                error = %e,
                                bytes = payload.len(),
                                "Dropping malformed push message"
                            );
                        }
                    },
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Push connection error");
                        return Exit::Interrupted;
                    }
                    None => {
                        tracing::info!("Push connection closed by peer");
                        return Exit::Interrupted;
                    }
                },
            }
        }
    }

    /// Sleep for `delay` unless teardown comes first. Returns false on teardown.
    async fn wait(&mut self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = &mut self.shutdown => false,
            _ = self.events.closed() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn transition(&mut self, step: fn(&mut ConnectionState) -> Result<(), InvalidTransition>) {
        if let Err(e) = step(&mut self.state) {
            tracing::error!(error = %e, "Rejected connection transition");
        }
        self.phase_tx.send_replace(self.state.phase);
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    let next = current + current;
    if next > max {
        max
    } else {
        next
    }
}
