//! Synchronization configuration

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use url::Url;

use crate::error::ConfigError;

/// Environment variable holding the push endpoint
pub const PUSH_ENDPOINT_ENV: &str = "WEB_SOCKET_ENDPOINT";

/// Push endpoint used when none is configured
pub const DEFAULT_PUSH_ENDPOINT: &str = "ws://127.0.0.1:3001/";

/// The push transport drops a connection after this much silence
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Keep-alive cadence, 30 seconds under the idle timeout
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(9 * 60 + 30);

/// How long a subscription outlives its last consumer
pub const DEFAULT_KEEP_UNUSED_FOR: Duration = Duration::from_secs(5);

/// Smallest slack allowed between heartbeat and idle deadline
pub const MIN_HEARTBEAT_MARGIN: Duration = Duration::from_secs(1);

/// Synchronization options
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Push endpoint (`ws://` or `wss://`)
    pub push_endpoint: Url,

    /// Server-side idle disconnect window
    pub idle_timeout: Duration,

    /// Keep-alive interval, strictly less than `idle_timeout`
    pub heartbeat_interval: Duration,

    /// Linger after the last consumer unsubscribes
    pub keep_unused_for: Duration,

    /// First reconnect delay
    pub reconnect_min_backoff: Duration,

    /// Reconnect delay ceiling
    pub reconnect_max_backoff: Duration,

    /// Capacity of the supervisor -> controller event channel
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            push_endpoint: Url::parse(DEFAULT_PUSH_ENDPOINT).expect("default endpoint is valid"),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            keep_unused_for: DEFAULT_KEEP_UNUSED_FOR,
            reconnect_min_backoff: Duration::from_secs(1),
            reconnect_max_backoff: Duration::from_secs(10),
            event_buffer: 256,
        }
    }
}

impl SyncConfig {
    /// Create a config pointing at the given push endpoint
    pub fn with_endpoint(endpoint: Url) -> Self {
        Self {
            push_endpoint: endpoint,
            ..Default::default()
        }
    }

    /// Build a config from `WEB_SOCKET_ENDPOINT`
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var(PUSH_ENDPOINT_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingEnv(PUSH_ENDPOINT_ENV))?;
        let endpoint = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;

        let config = Self::with_endpoint(endpoint);
        config.validate()?;
        Ok(config)
    }

    /// Set the push endpoint
    pub fn push_endpoint(mut self, endpoint: Url) -> Self {
        self.push_endpoint = endpoint;
        self
    }

    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the heartbeat interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the linger period after the last consumer leaves
    pub fn keep_unused_for(mut self, linger: Duration) -> Self {
        self.keep_unused_for = linger;
        self
    }

    /// Set reconnect backoff bounds
    pub fn reconnect_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.reconnect_min_backoff = min;
        self.reconnect_max_backoff = max;
        self
    }

    /// Set event channel capacity
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    /// Slack the heartbeat must leave before the idle deadline: 5% of the
    /// idle window, at least one second
    pub fn heartbeat_margin(&self) -> Duration {
        (self.idle_timeout / 20).max(MIN_HEARTBEAT_MARGIN)
    }

    /// Check that the heartbeat fires at least [`heartbeat_margin`] before
    /// the idle deadline and the backoff bounds are ordered
    ///
    /// [`heartbeat_margin`]: SyncConfig::heartbeat_margin
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroHeartbeat);
        }
        let margin = self.heartbeat_margin();
        if self.heartbeat_interval.saturating_add(margin) > self.idle_timeout {
            return Err(ConfigError::HeartbeatTooLong {
                heartbeat: self.heartbeat_interval,
                idle: self.idle_timeout,
                margin,
            });
        }
        if self.reconnect_min_backoff > self.reconnect_max_backoff {
            return Err(ConfigError::BackoffRange {
                min: self.reconnect_min_backoff,
                max: self.reconnect_max_backoff,
            });
        }
        match self.push_endpoint.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Shared, updatable auth token
///
/// The token is read when a subscription opens its push connection, so a
/// token set after `subscribe()` only applies to the next subscription.
#[derive(Clone, Default)]
pub struct AuthToken {
    inner: Arc<RwLock<Option<String>>>,
}

impl AuthToken {
    /// Create a token cell holding `token`
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(token.into()))),
        }
    }

    /// Current token, if any
    pub fn get(&self) -> Option<String> {
        self.inner.read().clone()
    }

    /// Replace the token
    pub fn set(&self, token: impl Into<String>) {
        *self.inner.write() = Some(token.into());
    }

    /// Remove the token
    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    pub fn is_set(&self) -> bool {
        self.inner.read().is_some()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_set() { "<redacted>" } else { "<unset>" };
        f.debug_tuple("AuthToken").field(&state).finish()
    }
}
