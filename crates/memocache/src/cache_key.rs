use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::{CacheContents, CacheError};

/// The canonical key derived from an argument tuple.
///
/// Equal argument tuples (by deep value equality, order-sensitive) always
/// encode to equal keys, and different tuples to different keys: identity is
/// the full canonical serialization of the arguments, not a hash of it.
/// Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    raw: Arc<str>,
}

impl CacheKey {
    /// Encodes an argument tuple into its canonical [`CacheKey`].
    ///
    /// The encoding is the JSON serialization of the tuple, which is
    /// deterministic, order-preserving and delimiter-safe. Arguments that
    /// cannot be serialized are a contract violation and yield
    /// [`CacheError::InvalidKey`] without touching any cache state.
    pub fn from_args<A>(args: &A) -> CacheContents<Self>
    where
        A: Serialize + ?Sized,
    {
        let raw = serde_json::to_string(args).map_err(|e| {
            tracing::error!(error = %e, "Cache arguments are not serializable");
            CacheError::InvalidKey(e.to_string())
        })?;

        Ok(CacheKey { raw: raw.into() })
    }

    /// Returns the canonical text of this key.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
