//! Request-scoped resource container (§4.8).
//!
//! Holds four lazily initialized resources (columnar readers, manifest
//! reader, geo index, FTS index, vector index) behind a per-resource
//! single-flight guard, and owns the per-request LRU caches the columnar
//! reader uses. On drop, every reference held is released; the large
//! cross-request indexes live in the process-wide [`SharedCaches`] instead
//! of being rebuilt per request.

pub mod shared_cache;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tokio::sync::OnceCell;

use crate::config::Config;
use crate::error::Result;
use crate::fts::{self, FtsIndex};
use crate::geo::GeoIndex;
use crate::manifest::ManifestReader;
use crate::parquet_reader::cache::{FooterCache, RowGroupCache};
use crate::parquet_reader::ColumnarReader;
use crate::range_fetch::RangeFetchBuffer;
use crate::vector::{DistanceMetric, VectorIndex};
use shared_cache::SharedIndexCache;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Process-wide, read-only-once-built index caches (§5's "single-writer
/// many-readers" shared-resource policy). Constructed once at process
/// start and handed to every request context.
pub struct SharedCaches {
    pub manifest: SharedIndexCache<ManifestReader>,
    pub geo_index: SharedIndexCache<GeoIndex>,
    pub fts_index: SharedIndexCache<FtsIndex>,
    pub vector_index: SharedIndexCache<VectorIndex>,
}

impl SharedCaches {
    pub fn new() -> Self {
        Self {
            manifest: SharedIndexCache::new(),
            geo_index: SharedIndexCache::new(),
            fts_index: SharedIndexCache::new(),
            vector_index: SharedIndexCache::new(),
        }
    }
}

impl Default for SharedCaches {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RequestContext {
    store: Arc<dyn ObjectStore>,
    config: Arc<Config>,
    shared: Arc<SharedCaches>,
    footer_cache: Arc<FooterCache>,
    row_group_cache: Arc<RowGroupCache>,
    columnar_readers: DashMap<String, Arc<OnceCell<Arc<ColumnarReader>>>>,
}

impl RequestContext {
    pub fn new(store: Arc<dyn ObjectStore>, config: Arc<Config>, shared: Arc<SharedCaches>) -> Self {
        let per_resource_budget = config.cache_budget_bytes / 2;
        Self {
            store,
            config,
            shared,
            footer_cache: Arc::new(FooterCache::new(per_resource_budget)),
            row_group_cache: Arc::new(RowGroupCache::new(per_resource_budget)),
            columnar_readers: DashMap::new(),
        }
    }

    /// Returns the columnar reader for `file_path`, opening the
    /// range-fetch buffer on first access. Concurrent requests for the
    /// same path within this context share one load future.
    pub async fn columnar_reader(&self, file_path: &str) -> Result<Arc<ColumnarReader>> {
        let slot = self
            .columnar_readers
            .entry(file_path.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let reader = slot
            .get_or_try_init(|| async {
                let path = ObjectPath::from(file_path);
                let buffer = RangeFetchBuffer::open(
                    self.store.clone(),
                    path,
                    self.config.cache_budget_bytes,
                    DEFAULT_REQUEST_TIMEOUT,
                )
                .await?;
                Ok::<_, crate::error::KbError>(Arc::new(ColumnarReader::new(
                    Arc::new(buffer),
                    self.footer_cache.clone(),
                    self.row_group_cache.clone(),
                )))
            })
            .await?;
        Ok(reader.clone())
    }

    pub async fn manifest(&self) -> Result<Arc<ManifestReader>> {
        let data_root = self.config.data_root.clone();
        let index_root = self.config.index_root.clone();
        self.shared
            .manifest
            .get_or_build("manifest", || async move {
                ManifestReader::load(self.store.clone(), &data_root, &index_root, DEFAULT_REQUEST_TIMEOUT).await
            })
            .await
    }

    pub async fn geo_index(&self) -> Result<Arc<GeoIndex>> {
        let index_root = self.config.index_root.clone();
        self.shared
            .geo_index
            .get_or_build("geo", || async move {
                let path = ObjectPath::from(format!("{}/geo-index.json", index_root.trim_end_matches('/')));
                let buffer = RangeFetchBuffer::open(self.store.clone(), path, 0, DEFAULT_REQUEST_TIMEOUT).await?;
                let bytes = buffer.slice(0, buffer.byte_length()).await?;
                GeoIndex::from_json(&bytes)
            })
            .await
    }

    pub async fn fts_index(&self) -> Result<Arc<FtsIndex>> {
        let index_root = self.config.index_root.clone();
        self.shared
            .fts_index
            .get_or_build("fts", || async move {
                let path = ObjectPath::from(format!(
                    "{}/fts/articles.json.gz",
                    index_root.trim_end_matches('/')
                ));
                let buffer = RangeFetchBuffer::open(self.store.clone(), path, 0, DEFAULT_REQUEST_TIMEOUT).await?;
                let bytes = buffer.slice(0, buffer.byte_length()).await?;
                fts::load_gzip_json(&bytes)
            })
            .await
    }

    /// Vector index for `(model, category)`, loading and building the
    /// HNSW graph from the category's `.lance` partition on first access.
    pub async fn vector_index(&self, model: &str, category: &str) -> Result<Arc<VectorIndex>> {
        let key = format!("{model}/{category}");
        let data_root = self.config.data_root.clone();
        let store = self.store.clone();
        self.shared
            .vector_index
            .get_or_build(&key, || async move {
                let path = ObjectPath::from(format!(
                    "{}/embeddings/{model}/{category}.lance",
                    data_root.trim_end_matches('/')
                ));
                let buffer = RangeFetchBuffer::open(store, path, 0, DEFAULT_REQUEST_TIMEOUT).await?;
                let bytes = buffer.slice(0, buffer.byte_length()).await?;
                VectorIndex::build_from_lance_bytes(&bytes, DistanceMetric::Cosine, 0)
            })
            .await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
