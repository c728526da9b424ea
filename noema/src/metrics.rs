//! Process-wide atomic counters keyed by error kind and phase.
//!
//! Grounded on the teacher's `Usage`/token-accumulation pattern
//! (`agent/runner.rs::accumulate_usage`), generalized from token counts to
//! generic labeled counters guarded by a mutex-free atomic map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// A registry of named monotonic counters.
#[derive(Debug, Default)]
pub struct Metrics {
    counters: RwLock<HashMap<String, AtomicU64>>,
}

impl Metrics {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter named `key` by 1, creating it if absent.
    pub fn incr(&self, key: &str) {
        if let Some(counter) = self.counters.read().expect("lock poisoned").get(key) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let mut counters = self.counters.write().expect("lock poisoned");
        counters
            .entry(key.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Current value of the counter named `key`, or 0 if never incremented.
    #[must_use]
    pub fn get(&self, key: &str) -> u64 {
        self.counters
            .read()
            .expect("lock poisoned")
            .get(key)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Snapshot all counters for the `GET /health` response.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counters
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }
}
