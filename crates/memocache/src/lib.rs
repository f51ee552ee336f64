//! # memocache
//!
//! A memoizing cache that sits in front of an expensive, possibly
//! asynchronous, producer function. Callers request a value by an argument
//! tuple; the cache returns a previously computed result if still valid, or
//! triggers exactly one production attempt shared by all concurrent
//! requesters for the same argument tuple, then fans the result out to
//! everyone waiting.
//!
//! ## Anatomy of a request
//!
//! A request goes through the following steps:
//! - The argument tuple is encoded into a canonical [`CacheKey`].
//! - The entry for that key is looked up and checked against the configured
//!   expiration thresholds.
//! - A valid entry is delivered right away, refreshing its last-access time.
//! - If a production for the key is already in flight, the caller is attached
//!   as a waiter on it instead of starting a second one.
//! - Otherwise the fetcher is invoked once, in a background task, and every
//!   waiter that accumulates until it reports receives the same outcome, in
//!   registration order.
//!
//! ## [`CacheContents`] / [`CacheError`]
//!
//! The cache deals in [`CacheContents`], an alias for a [`Result`] around a
//! [`CacheError`]. An error reported by the fetcher is not an exceptional
//! condition here: it is cached as data like any successful value, expires
//! under its own threshold ([`CacheConfig::retry_errors_after`]), and is
//! delivered to every waiter through whichever calling convention they chose.
//!
//! ## Calling conventions
//!
//! Three ways of consuming the *same* entry:
//! - [`MemoCache::get_value`] — synchronous lookup, never invokes the
//!   fetcher. Misses and cached errors are both `None`; this path cannot
//!   distinguish them.
//! - [`MemoCache::get_with`] — callback style. Fires synchronously within the
//!   call when the entry is valid, otherwise exactly once when the pending
//!   production completes.
//! - [`MemoCache::get`] — future style, same semantics as the callback path.
//!
//! A value produced through one convention is visible to reads through the
//! others.
//!
//! ## Expiration
//!
//! Three independent thresholds, combined with a logical AND of validity (the
//! first one crossed invalidates the entry): [`CacheConfig::max_alive_for`]
//! (entry age), [`CacheConfig::max_unused_for`] (time since last access), and
//! [`CacheConfig::retry_errors_after`] (entry age, error outcomes only). Each
//! is an [`Expiry`], which can also be [`Expiry::WhileProducing`]: the
//! outcome is then handed to the waiters of the in-flight production and
//! discarded immediately afterwards.
//!
//! Expired entries are evicted by a background sweep whose period is the
//! smallest configured threshold, floored at
//! [`CacheConfig::min_sweep_interval`] to bound sweep overhead. The sweep
//! never evicts an entry whose production is still in flight.
//!
//! ## Examples
//!
//! A plain lookup table with no fetcher never produces anything on its own:
//!
//! ```
//! use memocache::{CacheConfig, MemoCache};
//!
//! let cache: MemoCache<(u32, u32), String> = MemoCache::new(CacheConfig::default()).unwrap();
//!
//! assert_eq!(cache.get_value(&(6, 7)), None);
//! cache.put(&(6, 7), "42".to_owned()).unwrap();
//! assert_eq!(cache.get_value(&(6, 7)), Some("42".to_owned()));
//! ```
//!
//! With a fetcher, concurrent requests for the same key collapse into a
//! single invocation:
//!
//! ```
//! use futures::FutureExt;
//! use memocache::{CacheConfig, CacheError, MemoCache};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let cache = MemoCache::with_fetcher(CacheConfig::default(), |name: String| {
//!     async move { Ok::<_, CacheError>(format!("hello {name}")) }.boxed()
//! })
//! .unwrap();
//!
//! assert_eq!(
//!     cache.get("world".to_owned()).await.as_deref(),
//!     Ok("hello world")
//! );
//! # });
//! ```

#![warn(missing_docs)]

mod cache_error;
mod cache_key;
mod cleanup;
mod config;
mod entry;
mod fetcher;
mod memory;

#[cfg(any(test, feature = "test"))]
#[allow(missing_docs)]
pub mod test;


pub use cache_error::{CacheContents, CacheError};
pub use cache_key::CacheKey;
pub use config::{
    CacheConfig, ConfigError, DEFAULT_MIN_SWEEP_INTERVAL, Expiry, ONE_DAY, ONE_HOUR, ONE_MINUTE,
    ONE_SECOND,
};
pub use fetcher::Fetcher;
pub use memory::MemoCache;

#[cfg(any(test, feature = "test"))]
pub(crate) use tokio::time;

#[cfg(not(any(test, feature = "test")))]
pub(crate) use std::time;
