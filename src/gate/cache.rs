//! Evaluation cache with short TTL and per-key coalescing.
//!
//! Repeated page renders for the same account and conditions reuse a recent
//! result instead of re-reading every chain. Concurrent callers for a key that
//! is still being computed wait on that one computation and receive the same
//! `Arc`.

use crate::gate::types::{EvaluationKey, EvaluationResult};
use log::debug;
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Result freshness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Upper bound on cached (account, conditions) pairs.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

pub struct EvaluationCache {
    cache: Cache<EvaluationKey, Arc<EvaluationResult>>,
}

impl Default for EvaluationCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl EvaluationCache {
    /// Create a cache with the given freshness window and size cap.
    ///
    /// # Arguments
    /// * `ttl` - How long a result is served without re-reading chains
    /// * `max_entries` - Entries kept before least-valuable ones are evicted
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    /// A fresh cached result, if any.
    pub async fn get(&self, key: &EvaluationKey) -> Option<Arc<EvaluationResult>> {
        self.cache.get(key).await
    }

    /// Return the cached result for `key`, computing it with `compute` if absent.
    ///
    /// At most one `compute` runs per key at a time; other callers arriving
    /// while it runs receive its result.
    pub async fn evaluate<F>(&self, key: &EvaluationKey, compute: F) -> Arc<EvaluationResult>
    where
        F: Future<Output = EvaluationResult>,
    {
        let entry = self
            .cache
            .entry_by_ref(key)
            .or_insert_with(async move { Arc::new(compute.await) })
            .await;

        if entry.is_fresh() {
            debug!("evaluated {}", key);
        } else {
            debug!("cache hit for {}", key);
        }
        entry.into_value()
    }

    /// Drop the cached result for `key`.
    pub async fn invalidate(&self, key: &EvaluationKey) {
        self.cache.invalidate(key).await;
    }

    /// Store `result` under `key` unconditionally, replacing any cached value.
    pub async fn replace(
        &self,
        key: &EvaluationKey,
        result: EvaluationResult,
    ) -> Arc<EvaluationResult> {
        let result = Arc::new(result);
        self.cache.insert(key.clone(), result.clone()).await;
        debug!("replaced {}", key);
        result
    }

    /// Approximate; pending evictions are applied by `run_pending_tasks`.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Apply pending evictions and expirations now.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}
