//! Process-local result cache shared by the validators.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

/// Keyed get-or-fetch cache for validation results.
///
/// Concurrent callers asking for the same key collapse onto a single fetch:
/// the map hands out one `OnceCell` per key under a short lock, and
/// `OnceCell::get_or_init` guarantees exactly one initializer runs while
/// the rest await its result. Entries live until [`ValidationCache::clear`].
pub struct ValidationCache<V> {
    entries: Mutex<HashMap<String, Arc<OnceCell<V>>>>,
}

impl<V: Clone> ValidationCache<V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, fetching it at most once.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = V>,
    {
        let cell = {
            let mut entries = self.entries.lock().expect("cache lock poisoned");
            Arc::clone(entries.entry(key.to_owned()).or_default())
        };
        cell.get_or_init(fetch).await.clone()
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }

    /// Snapshot of the resolved values currently cached.
    ///
    /// Keys whose fetch is still in flight are skipped.
    pub fn values(&self) -> Vec<V> {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .values()
            .filter_map(|cell| cell.get().cloned())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for ValidationCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn second_lookup_hits_the_cache() {
        let cache: ValidationCache<u32> = ValidationCache::new();
        let fetches = AtomicU32::new(0);

        let first = cache
            .get_or_fetch("key", || async {
                fetches.fetch_add(1, Ordering::SeqCst);
                41
            })
            .await;
        let second = cache
            .get_or_fetch("key", || async {
                fetches.fetch_add(1, Ordering::SeqCst);
                99
            })
            .await;

        assert_eq!(first, 41);
        assert_eq!(second, 41, "cached value wins over a second fetch");
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_forces_a_refetch() {
        let cache: ValidationCache<u32> = ValidationCache::new();
        let fetches = AtomicU32::new(0);

        let fetch = || async {
            fetches.fetch_add(1, Ordering::SeqCst);
            1
        };
        cache.get_or_fetch("key", fetch).await;
        cache.clear();
        cache.get_or_fetch("key", fetch).await;

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_lookups_collapse_to_one_fetch() {
        let cache = Arc::new(ValidationCache::<u32>::new());
        let fetches = Arc::new(AtomicU32::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let fetches = Arc::clone(&fetches);
                tokio::spawn(async move {
                    cache
                        .get_or_fetch("shared", || async move {
                            fetches.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                            5
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), 5);
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
