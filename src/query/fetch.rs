//! Bulk fetch collaborator

use std::future::Future;

use futures_util::future::BoxFuture;

use crate::error::FetchError;
use crate::record::Record;

/// Future returned by a [`CollectionFetcher`]
pub type FetchFuture = BoxFuture<'static, Result<Vec<Record>, FetchError>>;

/// Produces the authoritative baseline of the collection
///
/// Implemented for [`RestClient`](crate::api::RestClient) and for any
/// `Fn(Option<String>) -> impl Future<Output = Result<Vec<Record>, FetchError>>`,
/// which is handy in tests:
///
/// ```
/// use livesync_rs::query::CollectionFetcher;
/// use livesync_rs::record::Record;
///
/// let fetcher = |_token: Option<String>| async {
///     Ok::<_, livesync_rs::error::FetchError>(vec![Record::new("A")])
/// };
/// let _future = fetcher.fetch_collection(None);
/// ```
pub trait CollectionFetcher: Send + Sync + 'static {
    /// Fetch the current records, newest first
    fn fetch_collection(&self, token: Option<String>) -> FetchFuture;
}

impl<F, Fut> CollectionFetcher for F
where
    F: Fn(Option<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Record>, FetchError>> + Send + 'static,
{
    fn fetch_collection(&self, token: Option<String>) -> FetchFuture {
        Box::pin(self(token))
    }
}
