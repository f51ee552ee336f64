use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::CacheContents;
use crate::config::CacheConfig;
use crate::time::Instant;

/// The cached record for one argument-tuple key.
///
/// An entry is only kept in the store while it has something to say: a
/// completed outcome, an in-flight production, or both (a stale or `put`
/// outcome alongside a running production).
pub(crate) struct Entry<T> {
    /// The most recently completed or `put` outcome, if any.
    pub(crate) ready: Option<ReadyOutcome<T>>,
    /// The production attempt currently owning this entry, if any.
    pub(crate) production: Option<Production<T>>,
}

impl<T> Entry<T> {
    pub(crate) fn new() -> Self {
        Entry {
            ready: None,
            production: None,
        }
    }
}

impl<T> fmt::Debug for Entry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("ready", &self.ready.is_some())
            .field("producing", &self.production.is_some())
            .finish()
    }
}

/// A completed `(error, value)` outcome with its expiration bookkeeping.
#[derive(Debug)]
pub(crate) struct ReadyOutcome<T> {
    pub(crate) contents: CacheContents<T>,
    /// When this outcome was written. Reset by every production completion
    /// and every `put`.
    pub(crate) created_at: Instant,
    /// When this outcome was last served to a caller.
    pub(crate) last_accessed: Instant,
}

impl<T> ReadyOutcome<T> {
    pub(crate) fn new(contents: CacheContents<T>, now: Instant) -> Self {
        ReadyOutcome {
            contents,
            created_at: now,
            last_accessed: now,
        }
    }

    /// Evaluates the expiration policy for this outcome.
    ///
    /// Validity is the logical AND of all configured thresholds: entry age,
    /// access recency, and, for error outcomes, the error-specific age
    /// threshold (which is checked against creation time only).
    pub(crate) fn is_valid(&self, config: &CacheConfig, now: Instant) -> bool {
        if !config.max_alive_for.is_fresh(self.created_at, now) {
            return false;
        }
        if !config.max_unused_for.is_fresh(self.last_accessed, now) {
            return false;
        }
        if self.contents.is_err() && !config.retry_errors_after.is_fresh(self.created_at, now) {
            return false;
        }
        true
    }
}

/// One in-flight invocation of the fetcher.
///
/// The waiter list belongs to this production instance, not to the entry:
/// `put`, `remove` or `clear` racing the production must not lose the
/// continuations already registered on it. The background task driving the
/// fetcher holds the same `Arc` and drains the list exactly once when the
/// fetcher reports.
pub(crate) struct Production<T> {
    /// Identity of this attempt, so a completion can tell whether the entry
    /// it finds in the store is still its own.
    pub(crate) id: u64,
    pub(crate) waiters: Arc<Mutex<Vec<Waiter<T>>>>,
}

/// A registered delivery continuation awaiting an in-flight production.
///
/// Waiters are delivered in FIFO registration order.
pub(crate) enum Waiter<T> {
    /// Callback convention: a completion continuation.
    Callback(Box<dyn FnOnce(CacheContents<T>) + Send>),
    /// Future convention: the sending half of the caller's pending future.
    Channel(oneshot::Sender<CacheContents<T>>),
}

impl<T> Waiter<T> {
    /// Hands the outcome to the continuation. Consumes the waiter, so each
    /// one is delivered at most once by construction.
    pub(crate) fn deliver(self, outcome: CacheContents<T>) {
        match self {
            Waiter::Callback(callback) => callback(outcome),
            Waiter::Channel(tx) => {
                // The caller may have dropped its future; nothing to deliver to.
                tx.send(outcome).ok();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::CacheError;
    use crate::config::Expiry;

    fn outcome(contents: CacheContents<&'static str>, now: Instant) -> ReadyOutcome<&'static str> {
        ReadyOutcome::new(contents, now)
    }

    #[test]
    fn test_never_expires_by_default() {
        let now = Instant::now();
        let entry = outcome(Ok("hi"), now);
        let config = CacheConfig::default();

        assert!(entry.is_valid(&config, now + Duration::from_secs(365 * 24 * 3600)));
    }

    #[test]
    fn test_alive_threshold_against_creation() {
        let now = Instant::now();
        let config = CacheConfig {
            max_alive_for: Expiry::After(Duration::from_millis(100)),
            ..Default::default()
        };

        let mut entry = outcome(Ok("hi"), now);
        assert!(entry.is_valid(&config, now + Duration::from_millis(99)));
        assert!(!entry.is_valid(&config, now + Duration::from_millis(101)));

        // Access recency does not rescue an aged-out entry.
        entry.last_accessed = now + Duration::from_millis(90);
        assert!(!entry.is_valid(&config, now + Duration::from_millis(101)));
    }

    #[test]
    fn test_unused_threshold_against_access() {
        let now = Instant::now();
        let config = CacheConfig {
            max_unused_for: Expiry::After(Duration::from_millis(100)),
            ..Default::default()
        };

        let mut entry = outcome(Ok("hi"), now);
        assert!(!entry.is_valid(&config, now + Duration::from_millis(101)));

        // A read within the window keeps the entry alive.
        entry.last_accessed = now + Duration::from_millis(80);
        assert!(entry.is_valid(&config, now + Duration::from_millis(101)));
    }

    #[test]
    fn test_error_threshold_only_for_errors() {
        let now = Instant::now();
        let config = CacheConfig {
            retry_errors_after: Expiry::After(Duration::from_millis(100)),
            ..Default::default()
        };

        let ok = outcome(Ok("hi"), now);
        assert!(ok.is_valid(&config, now + Duration::from_secs(10)));

        let err = outcome(Err(CacheError::Rejected("boom".into())), now);
        assert!(err.is_valid(&config, now + Duration::from_millis(99)));
        assert!(!err.is_valid(&config, now + Duration::from_millis(101)));
    }

    #[test]
    fn test_error_threshold_ignores_access_recency() {
        let now = Instant::now();
        let config = CacheConfig {
            retry_errors_after: Expiry::After(Duration::from_millis(100)),
            ..Default::default()
        };

        let mut err = outcome(Err(CacheError::Rejected("boom".into())), now);
        err.last_accessed = now + Duration::from_millis(95);
        assert!(!err.is_valid(&config, now + Duration::from_millis(101)));
    }

    #[test]
    fn test_first_threshold_crossed_invalidates() {
        let now = Instant::now();
        let config = CacheConfig {
            max_alive_for: Expiry::After(Duration::from_secs(10)),
            max_unused_for: Expiry::After(Duration::from_millis(100)),
            ..Default::default()
        };

        let entry = outcome(Ok("hi"), now);
        assert!(entry.is_valid(&config, now + Duration::from_millis(50)));
        assert!(!entry.is_valid(&config, now + Duration::from_millis(150)));
    }

    #[test]
    fn test_while_producing_outcome_never_valid() {
        let now = Instant::now();
        let config = CacheConfig {
            max_alive_for: Expiry::WhileProducing,
            ..Default::default()
        };

        let entry = outcome(Ok("hi"), now);
        assert!(!entry.is_valid(&config, now));
    }
}
