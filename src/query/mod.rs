//! Live query over the synchronized collection
//!
//! ```text
//!   QueryHandle ─┐
//!   QueryHandle ─┼─► LiveQuery ──► Subscription (controller task)
//!   QueryHandle ─┘                   │        ▲          │
//!                                    │        │          ▼
//!                     CollectionFetcher   PushEvent   watch<CollectionSnapshot>
//!                                    │        │
//!                                    ▼        │
//!                               bulk fetch  ConnectionSupervisor
//! ```
//!
//! The controller task is the only writer of the collection. Consumers read
//! immutable [`CollectionSnapshot`]s through a `watch` channel and are
//! notified on every change.

pub mod fetch;
pub mod live;
mod replay;
pub mod snapshot;
pub mod subscription;

pub use fetch::{CollectionFetcher, FetchFuture};
pub use live::{LiveQuery, QueryHandle};
pub use snapshot::{CollectionSnapshot, QueryStatus};
pub use subscription::Subscription;
