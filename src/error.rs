//! Error types
//!
//! Only [`FetchError`] ever reaches a consumer, and it does so through the
//! published [`CollectionSnapshot`](crate::query::CollectionSnapshot) rather
//! than as a returned error. Transport churn and malformed push payloads are
//! logged and absorbed where they happen.

use std::time::Duration;

use thiserror::Error;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed message: {0}")]
    Decode(#[from] DecodeError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

/// Rejected configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("heartbeat interval {heartbeat:?} must leave at least {margin:?} before idle timeout {idle:?}")]
    HeartbeatTooLong {
        heartbeat: Duration,
        idle: Duration,
        margin: Duration,
    },

    #[error("heartbeat interval must be non-zero")]
    ZeroHeartbeat,

    #[error("reconnect backoff minimum {min:?} exceeds maximum {max:?}")]
    BackoffRange { min: Duration, max: Duration },

    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported push endpoint scheme: {0}")]
    UnsupportedScheme(String),
}

/// Bulk fetch failure, surfaced to consumers as a cache error state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Push transport failure, recovered by reconnecting
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Inbound push payload that could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("record payload has no id")]
    MissingId,

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// REST API failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    #[error("no client token, call create_client first")]
    MissingToken,
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Request(e.to_string())
        }
    }
}

impl From<url::ParseError> for ApiError {
    fn from(e: url::ParseError) -> Self {
        ApiError::Endpoint(e.to_string())
    }
}

impl From<ApiError> for FetchError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Status { status, body } => FetchError::Http {
                status,
                message: body,
            },
            ApiError::Decode(msg) => FetchError::Decode(msg),
            ApiError::Request(msg) | ApiError::Endpoint(msg) => FetchError::Network(msg),
            ApiError::MissingToken => FetchError::Network(ApiError::MissingToken.to_string()),
        }
    }
}

/// Result type for crate operations
pub type Result<T> = std::result::Result<T, Error>;
