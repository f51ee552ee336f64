//! Helpers for testing code built on this crate.
//!
//! Compiled when the `test` feature is enabled, or for this crate's own
//! tests. With the feature enabled the internal clock also switches to
//! `tokio::time`, so `tokio::time::pause`/`advance` control expiration
//! deterministically.

use tracing_subscriber::EnvFilter;

/// Setup function that is only run once.
///
/// Initializes a test-friendly `tracing` subscriber. Repeated calls are
/// no-ops, so every test can call this first thing.
pub fn setup() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("memocache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}
