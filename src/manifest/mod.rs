//! Manifest + id/title/type lookup (§4.4).
//!
//! Loads the partition manifest and the three auxiliary maps from object
//! storage, and combines them with the columnar reader to resolve a logical
//! id/title lookup into a concrete row.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{KbError, KbErrorKind, Result};
use crate::range_fetch::RangeFetchBuffer;

/// `(file path, row-group ordinal, row-within-group ordinal)` — resolves
/// one article with at most one range read per projected column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub file_path: String,
    pub row_group: usize,
    pub row: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFileEntry {
    pub path: String,
    pub byte_size: u64,
    pub row_count: u64,
    pub row_group_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub total_article_count: u64,
    pub category_counts: HashMap<String, u64>,
    pub files: Vec<DataFileEntry>,
}

/// Normalizes a title for index lookup: lowercase, underscores→spaces,
/// whitespace collapsed, trimmed.
pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase().replace('_', " ");
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdIndexEntry {
    pub location: LocationRecord,
    pub category: String,
}

pub struct ManifestReader {
    manifest: Manifest,
    title_index: HashMap<String, LocationRecord>,
    id_index: HashMap<String, IdIndexEntry>,
    type_index: HashMap<String, Vec<String>>,
}

const PRIMARY_MANIFEST_PATH: &str = "articles/manifest.json";
const FALLBACK_MANIFEST_PATH: &str = "articles/manifest.backup.json";
const TITLES_INDEX_PATH: &str = "titles.json";
const IDS_INDEX_PATH: &str = "ids.json";
const TYPES_INDEX_PATH: &str = "types.json";

impl ManifestReader {
    /// Loads the manifest from under `data_root` and the three auxiliary
    /// indexes from under `index_root` in `store`. Falls back once to an
    /// alternate manifest path on primary failure (§7); the three
    /// auxiliary indexes have no fallback and surface `NotFound` directly.
    pub async fn load(
        store: Arc<dyn ObjectStore>,
        data_root: &str,
        index_root: &str,
        request_timeout: Duration,
    ) -> Result<Self> {
        let manifest = match Self::load_json::<Manifest>(
            &store,
            data_root,
            PRIMARY_MANIFEST_PATH,
            request_timeout,
        )
        .await
        {
            Ok(m) => m,
            Err(primary_err) => {
                warn!(error = %primary_err, "primary manifest load failed, trying fallback path");
                Self::load_json::<Manifest>(&store, data_root, FALLBACK_MANIFEST_PATH, request_timeout)
                    .await
                    .map_err(|_| KbError::not_found("manifest unavailable at primary or fallback path"))?
            }
        };

        let title_index = Self::load_json::<HashMap<String, LocationRecord>>(
            &store,
            index_root,
            TITLES_INDEX_PATH,
            request_timeout,
        )
        .await?;
        let id_index = Self::load_json::<HashMap<String, IdIndexEntry>>(
            &store,
            index_root,
            IDS_INDEX_PATH,
            request_timeout,
        )
        .await?;
        let type_index = Self::load_json::<HashMap<String, Vec<String>>>(
            &store,
            index_root,
            TYPES_INDEX_PATH,
            request_timeout,
        )
        .await?;

        Ok(Self {
            manifest,
            title_index,
            id_index,
            type_index,
        })
    }

    async fn load_json<T: for<'de> Deserialize<'de>>(
        store: &Arc<dyn ObjectStore>,
        root: &str,
        relative_path: &str,
        request_timeout: Duration,
    ) -> Result<T> {
        let full_path = format!("{}/{}", root.trim_end_matches('/'), relative_path);
        let path = ObjectPath::from(full_path.as_str());
        let buffer = RangeFetchBuffer::open(store.clone(), path, 0, request_timeout).await?;
        let bytes = buffer.slice(0, buffer.byte_length()).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            KbError::with_source(KbErrorKind::Corrupt, format!("malformed json at {full_path}"), e)
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Single map probe after title normalization.
    pub fn lookup_title(&self, title: &str) -> Option<&LocationRecord> {
        self.title_index.get(&normalize_title(title))
    }

    pub fn lookup_id(&self, id: &str) -> Option<&IdIndexEntry> {
        self.id_index.get(id)
    }

    pub fn files_for_type(&self, category: &str) -> &[String] {
        self.type_index
            .get(category)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn type_stats(&self) -> &HashMap<String, u64> {
        &self.manifest.category_counts
    }
}
