//! REST client for the orders backend
//!
//! Supplies the bulk fetch for a [`LiveQuery`](crate::query::LiveQuery),
//! obtains the client token that authenticates both the REST calls and the
//! push connection, and sends order writes.

pub mod client;
pub mod config;
pub mod types;

pub use client::RestClient;
pub use config::{ApiConfig, API_ENDPOINT_ENV};
pub use types::{ClientTokenResponse, NewOrder, OrderUpdate};
