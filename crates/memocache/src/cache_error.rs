use thiserror::Error;

/// An error carried through the cache as data.
///
/// Outcomes reported by the fetcher are intended to be cached and expire
/// exactly like successful outcomes, so this type is cheap to clone and is
/// delivered to every waiter rather than raised once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// No servable outcome exists and this code path cannot start a
    /// production (no fetcher is configured, or the calling convention does
    /// not produce).
    #[error("not found")]
    NotFound,
    /// The opaque error reported by the fetcher for this argument tuple.
    ///
    /// The attached string is whatever the fetcher chose to report.
    #[error("rejected: {0}")]
    Rejected(String),
    /// The argument tuple could not be encoded into a cache key.
    ///
    /// This is a programmer error: cache arguments must have a deterministic
    /// serialization.
    #[error("invalid cache key: {0}")]
    InvalidKey(String),
}

impl CacheError {
    /// Creates a [`Rejected`](Self::Rejected) outcome from any error type.
    ///
    /// Intended for fetcher implementations that want to report an underlying
    /// failure without defining their own conversion.
    pub fn rejection<E: std::fmt::Display>(err: E) -> Self {
        Self::Rejected(err.to_string())
    }
}

/// The contents of a cache entry, either `Ok(T)` or the error explaining why
/// no usable value exists for the key.
pub type CacheContents<T = ()> = Result<T, CacheError>;
