//! Byte-budgeted LRU used by the range-fetch buffer and the columnar reader.
//!
//! Eviction is strict LRU by byte size: the oldest-touched entry is dropped
//! first, repeatedly, until the tracked total fits under budget. This is
//! deliberately generic over the cached value so the same structure backs
//! the range cache, the footer cache, and the row-group cache.

use indexmap::IndexMap;

pub trait ByteSized {
    fn byte_size(&self) -> u64;
}

impl ByteSized for bytes::Bytes {
    fn byte_size(&self) -> u64 {
        self.len() as u64
    }
}

/// Insertion-ordered map used as an LRU: touching a key moves it to the back.
pub struct ByteBudgetedLru<K, V> {
    budget_bytes: u64,
    used_bytes: u64,
    entries: IndexMap<K, V>,
}

impl<K: std::hash::Hash + Eq + Clone, V: ByteSized> ByteBudgetedLru<K, V> {
    pub fn new(budget_bytes: u64) -> Self {
        Self {
            budget_bytes,
            used_bytes: 0,
            entries: IndexMap::new(),
        }
    }

    pub fn budget_bytes(&self) -> u64 {
        self.budget_bytes
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a key, promoting it to most-recently-used on hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if let Some(idx) = self.entries.get_index_of(key) {
            self.entries.move_index(idx, self.entries.len() - 1);
            self.entries.get(key)
        } else {
            None
        }
    }

    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts a value, evicting least-recently-used entries until the
    /// tracked byte total is back under budget. An entry larger than the
    /// whole budget is still inserted (so a single huge read doesn't simply
    /// vanish) but immediately becomes the first eviction candidate for
    /// anything inserted after it.
    pub fn insert(&mut self, key: K, value: V) {
        let size = value.byte_size();
        if let Some(old) = self.entries.shift_remove(&key) {
            self.used_bytes = self.used_bytes.saturating_sub(old.byte_size());
        }
        self.entries.insert(key, value);
        self.used_bytes += size;
        self.evict_to_budget();
    }

    fn evict_to_budget(&mut self) {
        while self.used_bytes > self.budget_bytes && !self.entries.is_empty() {
            if let Some((_, v)) = self.entries.shift_remove_index(0) {
                self.used_bytes = self.used_bytes.saturating_sub(v.byte_size());
            }
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let v = self.entries.shift_remove(key)?;
        self.used_bytes = self.used_bytes.saturating_sub(v.byte_size());
        Some(v)
    }
}
