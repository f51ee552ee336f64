use std::sync::Weak;
use std::time::Duration;

use crate::memory::Inner;
use crate::time::Instant;

/// Accumulated sweep counters, for logging.
#[derive(Debug, Default)]
struct SweepStats {
    removed: usize,
    retained: usize,
}

/// Drives the periodic sweep for one cache.
///
/// Self-rescheduling: each iteration sleeps the full period after the
/// previous sweep finished, so a slow sweep delays the next one instead of
/// piling up. Holding only a [`Weak`] handle lets the task notice the cache
/// being dropped and wind itself down; [`shutdown`](crate::MemoCache::shutdown)
/// and `Drop` additionally abort it outright.
pub(crate) async fn run<A, T>(inner: Weak<Inner<A, T>>, period: Duration)
where
    A: 'static,
    T: 'static,
{
    loop {
        tokio::time::sleep(period).await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.sweep();
    }
}

impl<A, T> Inner<A, T> {
    /// Evicts all entries whose outcome is no longer valid.
    ///
    /// Entries with an in-flight production are never evicted here, whatever
    /// the state of their (stale) outcome: the production owns them until it
    /// reports.
    pub(crate) fn sweep(&self) {
        let now = Instant::now();
        let mut stats = SweepStats::default();

        let mut entries = self.entries.lock().unwrap();
        entries.retain(|key, entry| {
            if entry.production.is_some() {
                stats.retained += 1;
                return true;
            }
            let valid = entry
                .ready
                .as_ref()
                .is_some_and(|ready| ready.is_valid(&self.config, now));
            if valid {
                stats.retained += 1;
            } else {
                tracing::trace!(key = %key, "Evicting expired entry");
                stats.removed += 1;
            }
            valid
        });
        drop(entries);

        tracing::debug!(
            removed = stats.removed,
            retained = stats.retained,
            "Cache sweep finished"
        );
    }
}
