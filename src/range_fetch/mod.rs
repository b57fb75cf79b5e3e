//! Range-fetch buffer (§4.1).
//!
//! Wraps an object-store URL as a length-known, byte-addressable async blob
//! with bounded LRU caching of satisfied ranges. Grounded in the teacher's
//! `column_parquet_reader::read_metadata`, which already does the
//! "HEAD then range-GET, cache the tail" dance for Parquet footers; this
//! module generalizes that one-off into a reusable, general-purpose buffer
//! that the columnar reader (and in principle any other range consumer)
//! builds on.

pub mod lru;

use std::sync::Arc;
use std::time::Duration;

use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{KbError, KbErrorKind, Result};
use lru::ByteBudgetedLru;

/// A cached range, keyed by its inclusive-exclusive `[start, end)` byte span.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RangeKey {
    start: u64,
    end: u64,
}

/// Ranges smaller than this fraction of the cache's byte budget are admitted
/// into the cache; larger ones are served but not retained (per §4.1).
const MIN_CACHE_FRACTION: f64 = 0.10;

pub struct RangeFetchBuffer {
    store: Arc<dyn ObjectStore>,
    path: ObjectPath,
    byte_length: u64,
    timeout: Duration,
    cache: Mutex<ByteBudgetedLru<RangeKey, bytes::Bytes>>,
}

impl RangeFetchBuffer {
    /// Issues a HEAD request to learn the object's length, then constructs
    /// a buffer with an empty range cache.
    pub async fn open(
        store: Arc<dyn ObjectStore>,
        path: ObjectPath,
        cache_budget_bytes: u64,
        request_timeout: Duration,
    ) -> Result<Self> {
        let meta = timeout(request_timeout, store.head(&path))
            .await
            .map_err(|_| KbError::timeout("HEAD request timed out"))?
            .map_err(|e| KbError::with_source(KbErrorKind::NotFound, "HEAD failed", e))?;

        Ok(Self {
            store,
            path,
            byte_length: meta.size,
            timeout: request_timeout,
            cache: Mutex::new(ByteBudgetedLru::new(cache_budget_bytes)),
        })
    }

    pub fn byte_length(&self) -> u64 {
        self.byte_length
    }

    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Returns the bytes in `[start, end)`. Issues a single range-GET only
    /// if the region is not already cached; a fully-cached request performs
    /// no I/O.
    pub async fn slice(&self, start: u64, end: u64) -> Result<bytes::Bytes> {
        if start >= end {
            return Err(KbError::new(
                KbErrorKind::InvalidArgument,
                format!("invalid range [{start}, {end})"),
            ));
        }
        if end > self.byte_length {
            return Err(KbError::new(
                KbErrorKind::InvalidArgument,
                format!(
                    "range end {end} exceeds byte length {}",
                    self.byte_length
                ),
            ));
        }

        let key = RangeKey { start, end };
        {
            let mut cache = self.cache.lock().await;
            if let Some(hit) = cache.get(&key) {
                debug!(start, end, "range-fetch cache hit");
                return Ok(hit.clone());
            }
        }

        debug!(start, end, "range-fetch cache miss, issuing range GET");
        let range = start..end;
        let bytes = timeout(self.timeout, self.store.get_range(&self.path, range))
            .await
            .map_err(|_| KbError::timeout("range GET timed out"))?
            .map_err(KbError::from)?;

        let len = (end - start) as f64;
        let budget = self.cache.lock().await.budget_bytes() as f64;
        if budget > 0.0 && len / budget < MIN_CACHE_FRACTION {
            let mut cache = self.cache.lock().await;
            cache.insert(key, bytes.clone());
        }

        Ok(bytes)
    }

    /// Convenience for reading the last `n` bytes of the object.
    pub async fn tail(&self, n: u64) -> Result<bytes::Bytes> {
        let n = n.min(self.byte_length);
        self.slice(self.byte_length - n, self.byte_length).await
    }

    pub async fn cache_used_bytes(&self) -> u64 {
        self.cache.lock().await.used_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use object_store::PutPayload;

    async fn make_buffer(data: &[u8], budget: u64) -> RangeFetchBuffer {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let path = ObjectPath::from("blob.bin");
        store
            .put(&path, PutPayload::from_bytes(bytes::Bytes::copy_from_slice(data)))
            .await
            .unwrap();
        RangeFetchBuffer::open(store, path, budget, Duration::from_secs(10))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn byte_length_matches_object_size() {
        let buf = make_buffer(&[0u8; 1000], 10_000).await;
        assert_eq!(buf.byte_length(), 1000);
    }

    #[tokio::test]
    async fn slice_returns_requested_bytes() {
        let data: Vec<u8> = (0..=255u8).collect();
        let buf = make_buffer(&data, 10_000).await;
        let got = buf.slice(10, 20).await.unwrap();
        assert_eq!(&got[..], &data[10..20]);
    }

    #[tokio::test]
    async fn out_of_bounds_range_is_invalid_argument() {
        let buf = make_buffer(&[0u8; 100], 10_000).await;
        let err = buf.slice(50, 200).await.unwrap_err();
        assert_eq!(err.kind(), KbErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn cached_range_requires_no_further_io() {
        let data: Vec<u8> = (0..=255u8).collect();
        // Tiny range relative to a huge budget, so it gets admitted.
        let buf = make_buffer(&data, 1_000_000).await;
        let first = buf.slice(0, 16).await.unwrap();
        let second = buf.slice(0, 16).await.unwrap();
        assert_eq!(first, second);
        assert!(buf.cache_used_bytes().await >= 16);
    }

    #[tokio::test]
    async fn large_range_is_not_admitted_to_cache() {
        let data = vec![0u8; 1000];
        let buf = make_buffer(&data, 1000).await; // budget == file size
        // A range covering > 10% of the budget should not be cached.
        buf.slice(0, 200).await.unwrap();
        assert_eq!(buf.cache_used_bytes().await, 0);
    }
}
