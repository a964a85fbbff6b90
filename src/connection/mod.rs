//! Push connection
//!
//! One [`ConnectionSupervisor`] per subscription owns the transport socket,
//! its [`Heartbeat`], and the [`ConnectionState`] machine. Nothing else
//! touches the socket; the subscription only sees a stream of
//! [`PushEvent`]s.

pub mod heartbeat;
pub mod state;
pub mod supervisor;
pub mod transport;

pub use heartbeat::Heartbeat;
pub use state::{ConnectionPhase, ConnectionState, InvalidTransition};
pub use supervisor::{ConnectionSupervisor, PushEvent};
pub use transport::{push_url, redacted, Connector, PushSocket, WsConnector, AUTH_QUERY_PARAM};
