//! Live query synchronization over a push channel
//!
//! Keeps a client-side, ordered collection of records consistent with the
//! server. A bulk fetch supplies the baseline, and a persistent push
//! connection delivers incremental updates that are merged in as they
//! arrive.
//!
//! # Architecture
//!
//! ```text
//!        LiveQuery::subscribe() ──► QueryHandle (snapshot / changed)
//!                  │                      ▲
//!                  ▼                      │ watch<CollectionSnapshot>
//!        ┌─────────────────────┐          │
//!        │ Subscription task   │──────────┘
//!        │   collection        │◄── CollectionFetcher (RestClient)
//!        │   replay buffer     │
//!        └─────────▲───────────┘
//!                  │ PushEvent
//!        ┌─────────┴───────────┐
//!        │ ConnectionSupervisor│──► Connector / PushSocket (WebSocket)
//!        │   heartbeat         │       ?authorization=<token>
//!        │   reconnect backoff │
//!        └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use livesync_rs::{ApiConfig, AuthToken, LiveQuery, RestClient, SyncConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let token = AuthToken::default();
//! let api = RestClient::new(ApiConfig::from_env()?, token.clone())?;
//! api.create_client().await?;
//!
//! let query = LiveQuery::new(SyncConfig::from_env()?, api, token)?;
//! let mut orders = query.subscribe();
//! while let Some(snapshot) = orders.changed().await {
//!     println!("{} orders", snapshot.records().len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod query;
pub mod record;
pub mod stats;

pub use api::{ApiConfig, RestClient};
pub use config::{AuthToken, SyncConfig};
pub use connection::{ConnectionPhase, Connector, PushSocket, WsConnector};
pub use error::{Error, Result};
pub use query::{CollectionFetcher, CollectionSnapshot, LiveQuery, QueryHandle, QueryStatus};
pub use record::{InboundMessage, Record, RecordId};
pub use stats::SyncStats;
