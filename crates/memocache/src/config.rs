use std::fmt;
use std::time::Duration;

use humantime_serde::re::humantime::{format_duration, parse_duration};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

use crate::time::Instant;

/// One second, for use in threshold configuration.
pub const ONE_SECOND: Duration = Duration::from_secs(1);
/// One minute, for use in threshold configuration.
pub const ONE_MINUTE: Duration = Duration::from_secs(60);
/// One hour, for use in threshold configuration.
pub const ONE_HOUR: Duration = Duration::from_secs(60 * 60);
/// One day, for use in threshold configuration.
pub const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// The default floor for the background sweep period.
pub const DEFAULT_MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// A single expiration threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// The threshold never invalidates an entry.
    #[default]
    Never,
    /// The outcome is only servable while its production is in flight: it is
    /// delivered to the accumulated waiters and discarded from the store
    /// immediately once production completes.
    WhileProducing,
    /// The entry becomes invalid once the threshold's reference timestamp is
    /// further in the past than this duration. Must be strictly positive.
    After(Duration),
}

impl Expiry {
    /// Whether an entry with `reference` as this threshold's timestamp is
    /// still fresh at `now`.
    ///
    /// [`WhileProducing`](Self::WhileProducing) entries are never
    /// independently fresh: this is only consulted for completed outcomes.
    pub(crate) fn is_fresh(self, reference: Instant, now: Instant) -> bool {
        match self {
            Expiry::Never => true,
            Expiry::WhileProducing => false,
            Expiry::After(threshold) => now.saturating_duration_since(reference) <= threshold,
        }
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expiry::Never => f.write_str("never"),
            Expiry::WhileProducing => f.write_str("while-producing"),
            Expiry::After(d) => write!(f, "{}", format_duration(*d)),
        }
    }
}

impl Serialize for Expiry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Expiry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            "never" => Ok(Expiry::Never),
            "while-producing" => Ok(Expiry::WhileProducing),
            other => parse_duration(other)
                .map(Expiry::After)
                .map_err(de::Error::custom),
        }
    }
}

/// Cache expiration and sweep configuration.
///
/// All fields are optional and default to "never expires"; a cache with the
/// default configuration keeps entries until they are explicitly removed.
#[derive(Debug, Clone, Copy, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum duration since an outcome was written (entry age).
    pub max_alive_for: Expiry,

    /// Maximum duration since an entry was last read.
    pub max_unused_for: Expiry,

    /// Maximum duration since an *error* outcome was written.
    ///
    /// Only consulted for entries whose outcome carries an error, in addition
    /// to the general thresholds. The reference point is the entry's creation
    /// time, never its access recency.
    pub retry_errors_after: Expiry,

    /// Floor for the background sweep period.
    ///
    /// The sweep runs at the smallest configured finite threshold; this floor
    /// prevents pathological tight loops when a threshold is tiny.
    #[serde(with = "humantime_serde")]
    pub min_sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_alive_for: Expiry::Never,
            max_unused_for: Expiry::Never,
            retry_errors_after: Expiry::Never,
            min_sweep_interval: DEFAULT_MIN_SWEEP_INTERVAL,
        }
    }
}

impl CacheConfig {
    /// Validates the configuration, surfacing malformed thresholds at
    /// construction time.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = [
            ("max_alive_for", self.max_alive_for),
            ("max_unused_for", self.max_unused_for),
            ("retry_errors_after", self.retry_errors_after),
        ];
        for (name, expiry) in thresholds {
            if expiry == Expiry::After(Duration::ZERO) {
                return Err(ConfigError::ZeroThreshold(name));
            }
        }
        if self.min_sweep_interval.is_zero() {
            return Err(ConfigError::ZeroSweepInterval);
        }
        Ok(())
    }

    /// The period of the background sweep: the smallest configured finite
    /// threshold, floored at [`min_sweep_interval`](Self::min_sweep_interval).
    ///
    /// `None` means nothing can expire and no sweep needs to run.
    pub(crate) fn sweep_interval(&self) -> Option<Duration> {
        let mut shortest: Option<Duration> = None;
        for expiry in [
            self.max_alive_for,
            self.max_unused_for,
            self.retry_errors_after,
        ] {
            if let Expiry::After(threshold) = expiry {
                shortest = Some(shortest.map_or(threshold, |s| s.min(threshold)));
            }
        }
        shortest.map(|s| s.max(self.min_sweep_interval))
    }

    /// Whether a freshly completed outcome must be discarded from the store
    /// right after its waiters have been handed the result.
    pub(crate) fn discards_after_production(&self, is_error: bool) -> bool {
        self.max_alive_for == Expiry::WhileProducing
            || self.max_unused_for == Expiry::WhileProducing
            || (is_error && self.retry_errors_after == Expiry::WhileProducing)
    }
}

/// A malformed [`CacheConfig`], rejected at construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A finite expiration threshold was zero; use [`Expiry::Never`] for
    /// entries that should not expire.
    #[error("expiration threshold `{0}` must be strictly positive")]
    ZeroThreshold(&'static str),
    /// The sweep interval floor was zero.
    #[error("minimum sweep interval must be strictly positive")]
    ZeroSweepInterval,
}
