//! Process-wide shared index cache (§5).
//!
//! The large HNSW, FTS, and geo indexes are expensive to build and
//! read-only once built, so they live behind a single-writer/many-readers
//! lock and are shared by reference across every request that needs them,
//! rather than rebuilt per request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::Result;

pub struct SharedIndexCache<T> {
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T> SharedIndexCache<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Arc<T>> {
        self.entries.read().await.get(key).cloned()
    }

    /// Returns the cached value for `key`, building it once under the
    /// write lock if absent. Concurrent callers for a missing key that
    /// lose the race to acquire the write lock see the winner's result
    /// rather than building redundantly (double-checked after acquiring
    /// the write lock).
    pub async fn get_or_build<F, Fut>(&self, key: &str, build: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(existing) = self.get(key).await {
            return Ok(existing);
        }

        let mut guard = self.entries.write().await;
        if let Some(existing) = guard.get(key) {
            return Ok(existing.clone());
        }
        let built = Arc::new(build().await?);
        guard.insert(key.to_string(), built.clone());
        Ok(built)
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl<T> Default for SharedIndexCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn get_or_build_builds_once_for_repeated_key() {
        let cache: SharedIndexCache<u32> = SharedIndexCache::new();
        let build_count = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let counter = build_count.clone();
            cache
                .get_or_build("k", || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await
                .unwrap();
        }

        assert_eq!(build_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_build_independently() {
        let cache: SharedIndexCache<u32> = SharedIndexCache::new();
        cache.get_or_build("a", || async { Ok(1) }).await.unwrap();
        cache.get_or_build("b", || async { Ok(2) }).await.unwrap();
        assert_eq!(cache.len().await, 2);
    }
}
