//! Query Cache
//!
//! Caches query responses keyed by an intent fingerprint, valid only while
//! the index checksum is unchanged. Guarantees at-most-one concurrent
//! retrieval per fingerprint: the second caller with the same fingerprint
//! waits for the first instead of duplicating work.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::model::content_hash;

// ============================================================================
// FINGERPRINT
// ============================================================================

/// Deterministic fingerprint of everything that can change a query's answer
pub fn query_fingerprint(
    intent: &str,
    depth: &str,
    affected_files: &[String],
    uc_requirements_hash: &str,
) -> String {
    let mut files = affected_files.to_vec();
    files.sort();
    content_hash(&format!(
        "{}|{depth}|{}|{uc_requirements_hash}",
        intent.trim().to_lowercase(),
        files.join(",")
    ))
}

// ============================================================================
// CACHE
// ============================================================================

struct CachedEntry<T> {
    value: T,
    index_checksum: String,
}

/// Fingerprint-keyed cache with per-fingerprint single-flight locks
pub struct QueryCache<T> {
    entries: RwLock<HashMap<String, CachedEntry<T>>>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: Clone> QueryCache<T> {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Acquire the single-flight lock for a fingerprint. Hold the guard for
    /// the whole lookup-or-compute sequence.
    pub async fn lock_fingerprint(&self, fingerprint: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut in_flight = self.in_flight.lock().await;
            Arc::clone(
                in_flight
                    .entry(fingerprint.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Cached value, if present and the index checksum still matches
    pub async fn get(&self, fingerprint: &str, current_checksum: &str) -> Option<T> {
        let entries = self.entries.read().await;
        match entries.get(fingerprint) {
            Some(entry) if entry.index_checksum == current_checksum => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value under the checksum it was computed against
    pub async fn put(&self, fingerprint: String, value: T, index_checksum: String) {
        let mut entries = self.entries.write().await;
        entries.insert(
            fingerprint,
            CachedEntry {
                value,
                index_checksum,
            },
        );
    }

    /// Drop every entry (index rebuilt, packs invalidated)
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Hit rate over the cache lifetime
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

impl<T: Clone> Default for QueryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_file_order() {
        let a = query_fingerprint(
            "how",
            "L1",
            &["b.ts".to_string(), "a.ts".to_string()],
            "uc",
        );
        let b = query_fingerprint(
            "how",
            "L1",
            &["a.ts".to_string(), "b.ts".to_string()],
            "uc",
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_sensitive_to_depth_and_intent() {
        let base = query_fingerprint("how", "L1", &[], "uc");
        assert_ne!(base, query_fingerprint("how", "L2", &[], "uc"));
        assert_ne!(base, query_fingerprint("why", "L1", &[], "uc"));
        // Case and surrounding whitespace do not matter
        assert_eq!(base, query_fingerprint("  How ", "L1", &[], "uc"));
    }

    #[tokio::test]
    async fn test_get_put_with_checksum() {
        let cache: QueryCache<String> = QueryCache::new();
        assert!(cache.get("fp", "c1").await.is_none());

        cache.put("fp".to_string(), "value".to_string(), "c1".to_string()).await;
        assert_eq!(cache.get("fp", "c1").await.as_deref(), Some("value"));

        // Checksum moved: entry is stale
        assert!(cache.get("fp", "c2").await.is_none());
    }

    #[tokio::test]
    async fn test_single_flight_serializes_same_fingerprint() {
        use std::sync::atomic::AtomicU32;

        let cache: Arc<QueryCache<u32>> = Arc::new(QueryCache::new());
        let computations = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            let computations = Arc::clone(&computations);
            handles.push(tokio::spawn(async move {
                let _guard = cache.lock_fingerprint("fp").await;
                if let Some(v) = cache.get("fp", "c1").await {
                    return v;
                }
                computations.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                cache.put("fp".to_string(), 42, "c1".to_string()).await;
                42
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(computations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hit_rate() {
        let cache: QueryCache<u32> = QueryCache::new();
        cache.put("fp".to_string(), 1, "c".to_string()).await;
        let _ = cache.get("fp", "c").await;
        let _ = cache.get("other", "c").await;
        assert!((cache.hit_rate() - 0.5).abs() < 1e-9);
    }
}
