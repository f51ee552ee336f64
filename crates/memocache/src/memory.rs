use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::oneshot;

use crate::cache_error::{CacheContents, CacheError};
use crate::cache_key::CacheKey;
use crate::cleanup;
use crate::config::{CacheConfig, ConfigError};
use crate::entry::{Entry, Production, ReadyOutcome, Waiter};
use crate::fetcher::Fetcher;
use crate::time::Instant;

/// A memoizing cache in front of an optional [`Fetcher`].
///
/// Concurrent requests for the same key are deduplicated: at most one fetcher
/// invocation is ever in flight per key, and every requester that arrives
/// before it reports receives the same outcome. See the crate docs for the
/// calling conventions and the expiration model.
///
/// The cache is cheap to clone; clones share the same entry store.
///
/// Constructing a cache whose [`CacheConfig`] has at least one finite
/// expiration threshold spawns the background sweep and therefore must happen
/// within a Tokio runtime.
pub struct MemoCache<A, T> {
    inner: Arc<Inner<A, T>>,
}

impl<A, T> Clone for MemoCache<A, T> {
    fn clone(&self) -> Self {
        // Manual impl, as derive would put bounds on `A` and `T`:
        // https://github.com/rust-lang/rust/issues/26925
        MemoCache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T> fmt::Debug for MemoCache<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self
            .inner
            .entries
            .try_lock()
            .map(|entries| entries.len())
            .unwrap_or_default();
        f.debug_struct("MemoCache")
            .field("config", &self.inner.config)
            .field("entries", &entries)
            .field("has_fetcher", &self.inner.fetcher.is_some())
            .finish()
    }
}

pub(crate) struct Inner<A, T> {
    pub(crate) config: CacheConfig,

    /// The entry store. The single shared mutable resource: all entry-state
    /// transitions happen under this lock, fetcher invocations never do.
    pub(crate) entries: Mutex<HashMap<CacheKey, Entry<T>>>,

    /// The producer capability. `None` for value-only caches, which
    /// structurally cannot trigger a production.
    fetcher: Option<Arc<dyn Fetcher<A, Item = T>>>,

    /// Identity source for production attempts.
    production_ids: AtomicU64,

    /// The background sweep task, if any threshold is finite.
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<A, T> Drop for Inner<A, T> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl<A, T> MemoCache<A, T>
where
    A: Serialize + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Creates a value-only cache: a pure lookup table fed through
    /// [`put`](Self::put) that never invokes a producer.
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        Self::build(config, None)
    }

    /// Creates a cache backed by a [`Fetcher`].
    pub fn with_fetcher<F>(config: CacheConfig, fetcher: F) -> Result<Self, ConfigError>
    where
        F: Fetcher<A, Item = T>,
    {
        Self::build(config, Some(Arc::new(fetcher)))
    }

    fn build(
        config: CacheConfig,
        fetcher: Option<Arc<dyn Fetcher<A, Item = T>>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let inner = Arc::new(Inner {
            config,
            entries: Mutex::new(HashMap::new()),
            fetcher,
            production_ids: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        });

        if let Some(period) = config.sweep_interval() {
            let handle = tokio::spawn(cleanup::run(Arc::downgrade(&inner), period));
            *inner.sweeper.lock().unwrap() = Some(handle);
        }

        Ok(MemoCache { inner })
    }

    /// Requests the value for `args`, producing it if necessary.
    ///
    /// Resolves immediately for a valid entry. Otherwise the returned future
    /// settles exactly once, when the (new or already in-flight) production
    /// for this key reports. Without a fetcher, an invalid entry is an
    /// immediate [`CacheError::NotFound`]. A fetcher that panics is reported
    /// as [`CacheError::Rejected`], and nothing is cached for the key.
    ///
    /// Starting a production spawns a task, so this requires a Tokio runtime.
    pub async fn get(&self, args: A) -> CacheContents<T> {
        let (tx, rx) = oneshot::channel();
        self.request(args, Waiter::Channel(tx));
        match rx.await {
            Ok(outcome) => outcome,
            // Last resort, for when the supervising task itself goes away
            // (runtime shutdown); surface that as a miss rather than hanging.
            Err(_) => Err(CacheError::NotFound),
        }
    }

    /// Requests the value for `args`, delivering it to `callback`.
    ///
    /// Same semantics as [`get`](Self::get): the callback fires synchronously
    /// within this call when the entry is valid, otherwise exactly once when
    /// the production completes. Starting a production spawns a task, so
    /// calls that can miss require a Tokio runtime.
    pub fn get_with<F>(&self, args: A, callback: F)
    where
        F: FnOnce(CacheContents<T>) + Send + 'static,
    {
        self.request(args, Waiter::Callback(Box::new(callback)));
    }

    /// Synchronous lookup. Never invokes the fetcher.
    ///
    /// Returns `None` both for a miss and for a cached error outcome; this
    /// path cannot distinguish "never fetched" from "fetched and failed". Use
    /// [`get`](Self::get) or [`get_with`](Self::get_with) to observe errors.
    pub fn get_value(&self, args: &A) -> Option<T> {
        let key = CacheKey::from_args(args).ok()?;
        let now = Instant::now();

        let mut entries = self.inner.entries.lock().unwrap();
        let ready = entries.get_mut(&key)?.ready.as_mut()?;
        if !ready.is_valid(&self.inner.config, now) {
            return None;
        }
        ready.last_accessed = now;
        ready.contents.clone().ok()
    }

    /// Unconditionally installs a fresh, fully valid success outcome.
    ///
    /// An in-flight production for the key is not cancelled: its waiters
    /// still receive its outcome once it reports, and that outcome then
    /// replaces this one.
    pub fn put(&self, args: &A, value: T) -> CacheContents<()> {
        let key = CacheKey::from_args(args)?;
        let now = Instant::now();

        let mut entries = self.inner.entries.lock().unwrap();
        let entry = entries.entry(key).or_insert_with(Entry::new);
        entry.ready = Some(ReadyOutcome::new(Ok(value), now));
        Ok(())
    }

    /// Drops the entry for `args`.
    ///
    /// A subsequent read never observes a value from before the removal. An
    /// in-flight production for the key keeps its waiters and delivers to
    /// them, but its outcome is not installed into the store.
    pub fn remove(&self, args: &A) -> CacheContents<()> {
        let key = CacheKey::from_args(args)?;
        self.inner.entries.lock().unwrap().remove(&key);
        Ok(())
    }

    /// Drops all entries. In-flight productions keep their waiters, as with
    /// [`remove`](Self::remove).
    pub fn clear(&self) {
        self.inner.entries.lock().unwrap().clear();
    }

    /// Stops the background sweep and drops all entries.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.sweeper.lock().unwrap().take() {
            handle.abort();
        }
        self.clear();
    }

    /// The number of entries currently in the store, including entries whose
    /// production is still in flight.
    pub fn entry_count(&self) -> usize {
        self.inner.entries.lock().unwrap().len()
    }

    /// The single-flight request path shared by [`get`](Self::get) and
    /// [`get_with`](Self::get_with).
    fn request(&self, args: A, waiter: Waiter<T>) {
        let key = match CacheKey::from_args(&args) {
            Ok(key) => key,
            Err(err) => return waiter.deliver(Err(err)),
        };
        let now = Instant::now();

        let mut entries = self.inner.entries.lock().unwrap();

        if let Some(entry) = entries.get_mut(&key) {
            if let Some(ready) = entry.ready.as_mut() {
                if ready.is_valid(&self.inner.config, now) {
                    ready.last_accessed = now;
                    let outcome = ready.contents.clone();
                    drop(entries);

                    tracing::trace!(key = %key, "Serving cached outcome");
                    return waiter.deliver(outcome);
                }
            }

            if let Some(production) = entry.production.as_ref() {
                tracing::trace!(key = %key, "Coalescing onto in-flight production");
                production.waiters.lock().unwrap().push(waiter);
                return;
            }
        }

        let Some(fetcher) = self.inner.fetcher.clone() else {
            drop(entries);
            return waiter.deliver(Err(CacheError::NotFound));
        };

        // Start a production owning this entry, with the caller as its first
        // waiter. The stale outcome must not be servable past this point.
        let id = self.inner.production_ids.fetch_add(1, Ordering::Relaxed);
        let waiters = Arc::new(Mutex::new(vec![waiter]));

        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        entry.ready = None;
        entry.production = Some(Production {
            id,
            waiters: Arc::clone(&waiters),
        });
        drop(entries);

        tracing::trace!(key = %key, id, "Spawning production");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            // The fetcher runs in a child task so a panic inside it unwinds
            // there and still leaves this task to settle the production.
            match tokio::spawn(fetcher.fetch(args)).await {
                Ok(outcome) => inner.complete_production(&key, id, waiters, outcome),
                Err(err) => inner.fail_production(&key, id, waiters, CacheError::rejection(err)),
            }
        });
    }
}

impl<A, T> Inner<A, T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Installs a finished production's outcome and drains its waiters.
    ///
    /// The store is only written if the entry still belongs to this
    /// production attempt; a `remove` or `clear` that raced it leaves the
    /// store untouched. The waiter list is drained exactly once, in FIFO
    /// registration order, after the store lock is released.
    fn complete_production(
        &self,
        key: &CacheKey,
        id: u64,
        waiters: Arc<Mutex<Vec<Waiter<T>>>>,
        outcome: CacheContents<T>,
    ) {
        let now = Instant::now();
        let discard = self.config.discards_after_production(outcome.is_err());

        let mut entries = self.entries.lock().unwrap();
        let owns_entry = entries.get_mut(key).is_some_and(|entry| {
            if entry.production.as_ref().is_some_and(|p| p.id == id) {
                entry.production = None;
                entry.ready = Some(ReadyOutcome::new(outcome.clone(), now));
                true
            } else {
                false
            }
        });
        if owns_entry && discard {
            // "While producing" sentinel: the outcome goes to the waiters
            // below and to nobody else.
            entries.remove(key);
        }
        drop(entries);

        let waiters = std::mem::take(&mut *waiters.lock().unwrap());
        tracing::trace!(key = %key, waiters = waiters.len(), "Production finished");
        for waiter in waiters {
            waiter.deliver(outcome.clone());
        }
    }

    /// Winds down a production whose fetcher task died without reporting.
    ///
    /// The production marker is cleared so the key is usable again, but
    /// nothing is cached: the waiters receive `error` and the next request
    /// retries the fetcher immediately. A `put` value that raced the failed
    /// production stays servable.
    fn fail_production(
        &self,
        key: &CacheKey,
        id: u64,
        waiters: Arc<Mutex<Vec<Waiter<T>>>>,
        error: CacheError,
    ) {
        let mut entries = self.entries.lock().unwrap();
        let abandoned = entries.get_mut(key).is_some_and(|entry| {
            if entry.production.as_ref().is_some_and(|p| p.id == id) {
                entry.production = None;
                entry.ready.is_none()
            } else {
                false
            }
        });
        if abandoned {
            entries.remove(key);
        }
        drop(entries);

        let waiters = std::mem::take(&mut *waiters.lock().unwrap());
        tracing::error!(
            key = %key,
            waiters = waiters.len(),
            error = %error,
            "Production task died without reporting"
        );
        for waiter in waiters {
            waiter.deliver(Err(error.clone()));
        }
    }
}
