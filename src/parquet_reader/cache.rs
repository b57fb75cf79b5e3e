//! Bounded caches for parsed footers and decoded row groups (§4.3 step 5).
//!
//! Both caches reuse the same strict byte-budgeted LRU the range-fetch
//! buffer uses for raw ranges, just keyed differently: footers by object
//! path, row groups by `(object path, row-group index)`.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::parquet_reader::footer::FileMetaData;
use crate::parquet_reader::page::Value;
use crate::range_fetch::lru::{ByteBudgetedLru, ByteSized};

/// Rough per-entry accounting: one `SchemaElement`/`ColumnChunk` costs about
/// this many bytes once its `String`/`Vec` allocations are counted. Good
/// enough for a soft memory budget; exactness doesn't matter here.
const ESTIMATED_BYTES_PER_SCHEMA_ELEMENT: u64 = 96;
const ESTIMATED_BYTES_PER_COLUMN_CHUNK: u64 = 160;

impl ByteSized for FileMetaData {
    fn byte_size(&self) -> u64 {
        let schema_bytes = self.schema.len() as u64 * ESTIMATED_BYTES_PER_SCHEMA_ELEMENT;
        let column_count: usize = self.row_groups.iter().map(|rg| rg.columns.len()).sum();
        let column_bytes = column_count as u64 * ESTIMATED_BYTES_PER_COLUMN_CHUNK;
        schema_bytes + column_bytes + 128
    }
}

/// A decoded row group: one named `Vec<Value>` per decoded column. Carries
/// its own column names rather than relying on positional alignment with
/// the full schema, since a projected read decodes a strict subset of
/// columns.
pub struct RowGroupData {
    pub columns: Vec<(String, Vec<Value>)>,
}

impl RowGroupData {
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_slice())
    }
}

impl ByteSized for RowGroupData {
    fn byte_size(&self) -> u64 {
        self.columns
            .iter()
            .map(|(_, values)| {
                values
                    .iter()
                    .map(|v| match v {
                        Value::Bytes(b) => b.len() as u64 + 8,
                        _ => 16,
                    })
                    .sum::<u64>()
            })
            .sum()
    }
}

pub struct FooterCache {
    inner: Mutex<ByteBudgetedLru<String, Arc<FileMetaData>>>,
}

impl FooterCache {
    pub fn new(budget_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(ByteBudgetedLru::new(budget_bytes)),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Arc<FileMetaData>> {
        self.inner.lock().await.get(&key.to_string()).cloned()
    }

    pub async fn insert(&self, key: String, value: Arc<FileMetaData>) {
        self.inner.lock().await.insert(key, value);
    }
}

pub struct RowGroupCache {
    inner: Mutex<ByteBudgetedLru<(String, usize), Arc<RowGroupData>>>,
}

impl RowGroupCache {
    pub fn new(budget_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(ByteBudgetedLru::new(budget_bytes)),
        }
    }

    pub async fn get(&self, path: &str, row_group_index: usize) -> Option<Arc<RowGroupData>> {
        self.inner
            .lock()
            .await
            .get(&(path.to_string(), row_group_index))
            .cloned()
    }

    pub async fn insert(&self, path: String, row_group_index: usize, value: Arc<RowGroupData>) {
        self.inner
            .lock()
            .await
            .insert((path, row_group_index), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parquet_reader::footer::FileMetaData;

    fn empty_metadata() -> FileMetaData {
        FileMetaData {
            version: 1,
            schema: Vec::new(),
            num_rows: 0,
            row_groups: Vec::new(),
        }
    }

    #[tokio::test]
    async fn footer_cache_roundtrips() {
        let cache = FooterCache::new(1_000_000);
        let meta = Arc::new(empty_metadata());
        cache.insert("a.parquet".to_string(), meta.clone()).await;
        let got = cache.get("a.parquet").await;
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn row_group_cache_roundtrips() {
        let cache = RowGroupCache::new(1_000_000);
        let data = Arc::new(RowGroupData {
            columns: vec![("id".to_string(), vec![Value::Int32(1), Value::Int32(2)])],
        });
        cache.insert("a.parquet".to_string(), 0, data).await;
        let got = cache.get("a.parquet", 0).await;
        assert!(got.is_some());
        assert_eq!(got.unwrap().column("id").unwrap().len(), 2);
    }
}
