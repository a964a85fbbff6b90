//! Connection state machine
//!
//! Tracks one push connection from the first connect attempt to teardown.

use std::fmt;
use std::time::Instant;

use thiserror::Error;

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Created, no attempt made yet
    Idle,
    /// First connect attempt in progress
    Connecting,
    /// Handshake complete, heartbeat running
    Open,
    /// Lost the connection (or never got one), retrying with backoff
    Reconnecting,
    /// Torn down; terminal
    Closed,
}

impl ConnectionPhase {
    pub fn is_open(self) -> bool {
        self == ConnectionPhase::Open
    }

    pub fn is_closed(self) -> bool {
        self == ConnectionPhase::Closed
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionPhase::Idle => "idle",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Open => "open",
            ConnectionPhase::Reconnecting => "reconnecting",
            ConnectionPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A transition the state machine does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid connection transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: ConnectionPhase,
    pub to: ConnectionPhase,
}

/// Complete connection state
#[derive(Debug)]
pub struct ConnectionState {
    /// Current phase
    pub phase: ConnectionPhase,

    /// When the current Open phase began
    pub opened_at: Option<Instant>,

    /// Failed attempts since the last successful open
    pub failed_attempts: u32,

    /// Successful opens over the connection's lifetime
    pub open_count: u64,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            phase: ConnectionPhase::Idle,
            opened_at: None,
            failed_attempts: 0,
            open_count: 0,
        }
    }

    fn reject(&self, to: ConnectionPhase) -> InvalidTransition {
        InvalidTransition {
            from: self.phase,
            to,
        }
    }

    /// Idle -> Connecting
    pub fn begin_connect(&mut self) -> Result<(), InvalidTransition> {
        match self.phase {
            ConnectionPhase::Idle => {
                self.phase = ConnectionPhase::Connecting;
                Ok(())
            }
            _ => Err(self.reject(ConnectionPhase::Connecting)),
        }
    }

    /// Connecting/Reconnecting -> Open
    pub fn on_open(&mut self) -> Result<(), InvalidTransition> {
        match self.phase {
            ConnectionPhase::Connecting | ConnectionPhase::Reconnecting => {
                self.phase = ConnectionPhase::Open;
                self.opened_at = Some(Instant::now());
                self.failed_attempts = 0;
                self.open_count += 1;
                Ok(())
            }
            _ => Err(self.reject(ConnectionPhase::Open)),
        }
    }

    /// Connecting/Open/Reconnecting -> Reconnecting
    ///
    /// A failed retry while already reconnecting stays in Reconnecting and
    /// counts another failed attempt.
    pub fn on_interrupted(&mut self) -> Result<(), InvalidTransition> {
        match self.phase {
            ConnectionPhase::Connecting
            | ConnectionPhase::Open
            | ConnectionPhase::Reconnecting => {
                self.phase = ConnectionPhase::Reconnecting;
                self.opened_at = None;
                self.failed_attempts = self.failed_attempts.saturating_add(1);
                Ok(())
            }
            _ => Err(self.reject(ConnectionPhase::Reconnecting)),
        }
    }

    /// Any phase -> Closed
    ///
    /// Returns false if the connection was already closed.
    pub fn close(&mut self) -> bool {
        if self.phase.is_closed() {
            return false;
        }
        self.phase = ConnectionPhase::Closed;
        self.opened_at = None;
        true
    }

    pub fn is_open(&self) -> bool {
        self.phase.is_open()
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}
