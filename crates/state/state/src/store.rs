use std::time::Duration;

use async_trait::async_trait;

use crate::error::StateError;
use crate::key::StateKey;

/// Result of a compare-and-swap operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasResult {
    /// The swap succeeded.
    Ok,
    /// The swap failed because the current value didn't match what the
    /// caller expected.
    Conflict { current_value: Option<String> },
}

/// Generic key/value store with TTL, used as the clustered-deployment seam
/// for process-singleton state (§5, §9): the rate limiter, the rebuild
/// scheduler's debounce bookkeeping, and the plug-in hot-reload watcher.
/// The in-memory reference driver (`latchflow-state-memory`) backs every
/// method with a process-local map; a clustered deployment swaps in a
/// shared backend (Redis, Postgres advisory state, ...) preserving the
/// same atomicity contract per key.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the value for a key. Returns `None` if not found or expired.
    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError>;

    /// Set a value with an optional TTL, overwriting any previous value.
    async fn set(&self, key: &StateKey, value: &str, ttl: Option<Duration>) -> Result<(), StateError>;

    /// Check if a key exists; if not, set it atomically with an optional TTL.
    /// Returns `true` if the key was newly set, `false` if it already existed.
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, key: &StateKey) -> Result<bool, StateError>;

    /// Atomically increment a counter by `delta`. Returns the new value.
    /// Creates the counter at 0 if it doesn't exist before incrementing.
    async fn increment(&self, key: &StateKey, delta: i64, ttl: Option<Duration>) -> Result<i64, StateError>;

    /// Compare-and-swap: update the value only if the current value equals
    /// `expected` (`None` meaning "must not currently exist").
    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected: Option<&str>,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError>;

    /// Append a timestamp (ms since epoch) to a sliding-window sample list
    /// at `key`, prune samples older than `window`, and return the
    /// remaining sample count. Backs the input-guard rate limiter (§4.4).
    async fn record_and_count_window(
        &self,
        key: &StateKey,
        now_ms: i64,
        window: Duration,
    ) -> Result<usize, StateError>;
}
