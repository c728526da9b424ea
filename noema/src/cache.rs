//! Mutex-guarded LRU+TTL cache for cache-eligible request answers.
//!
//! Grounded on the `lru` crate usage found in the sibling example pack
//! (`siumai`'s provider cache), since the teacher itself has no request
//! cache of its own to imitate directly.

use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;

struct Entry {
    value: String,
    inserted_at: Instant,
}

/// A request-level answer cache keyed by question fingerprint.
#[derive(Debug)]
pub struct RequestCache {
    ttl: Duration,
    inner: Mutex<LruCache<String, Entry>>,
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry").field("value", &self.value).finish()
    }
}

impl RequestCache {
    /// Build a cache bounded to `capacity` entries, each valid for `ttl`.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity.max(1))
            .unwrap_or_else(|| std::num::NonZeroUsize::new(1).expect("1 is non-zero"));
        Self {
            ttl,
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up `key`, returning `None` on miss or expiry.
    pub async fn get(&self, key: &str) -> Option<String> {
        let mut cache = self.inner.lock().await;
        match cache.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    /// Insert or refresh `key`.
    pub async fn put(&self, key: String, value: String) {
        let mut cache = self.inner.lock().await;
        cache.put(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Current number of entries (including possibly-expired ones).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hit_then_miss_after_ttl() {
        let cache = RequestCache::new(8, Duration::from_millis(20));
        cache.put("q".to_string(), "a".to_string()).await;
        assert_eq!(cache.get("q").await, Some("a".to_string()));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("q").await, None);
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let cache = RequestCache::new(2, Duration::from_secs(60));
        cache.put("a".to_string(), "1".to_string()).await;
        cache.put("b".to_string(), "2".to_string()).await;
        cache.put("c".to_string(), "3".to_string()).await;

        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.len().await, 2);
    }
}
