use futures::future::BoxFuture;

use super::CacheContents;

/// The producer half of a cache.
///
/// A fetcher is invoked with the request's argument tuple whenever no valid
/// outcome exists for its key and no production is already in flight. It
/// reports exactly one [`CacheContents`] outcome; both the success and the
/// error side are cached and fanned out to every waiter.
///
/// The future may suspend arbitrarily long. The cache never cancels it and
/// attaches no timeout: a pending request resolves when (and only when) the
/// fetcher reports.
///
/// Any `Fn(A) -> BoxFuture<'static, CacheContents<T>>` closure is a fetcher:
///
/// ```
/// use futures::FutureExt;
/// use memocache::{CacheConfig, CacheError, MemoCache};
///
/// let cache = MemoCache::with_fetcher(CacheConfig::default(), |user_id: u64| {
///     async move { Ok::<_, CacheError>(format!("profile of {user_id}")) }.boxed()
/// });
/// ```
pub trait Fetcher<A>: Send + Sync + 'static {
    /// The value produced for a key.
    type Item: Clone + Send + Sync + 'static;

    /// Produce the outcome for the given argument tuple.
    fn fetch(&self, args: A) -> BoxFuture<'static, CacheContents<Self::Item>>;
}

impl<A, T, F> Fetcher<A> for F
where
    F: Fn(A) -> BoxFuture<'static, CacheContents<T>> + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    type Item = T;

    fn fetch(&self, args: A) -> BoxFuture<'static, CacheContents<T>> {
        self(args)
    }
}
